mod common;

use common::*;
use interfaces::jobs::SkipRetry;
use news_feed::store::collections;
use news_feed::tasks::is_skip_retry;
use news_feed::types::*;
use news_feed::HubHandle;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Next text frame, skipping pings.
async fn next_text(client: &mut Client) -> Option<String> {
    let reading = async {
        while let Some(frame) = client.next().await {
            match frame.ok()? {
                Message::Text(text) => return Some(text.to_string()),
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(5), reading).await.ok().flatten()
}

#[tokio::test]
async fn test_broadcast_with_one_stalled_client() {
    init_tracing();
    let (hub, _task) = HubHandle::spawn(8);

    let (stalled_queue, mut stalled) = mpsc::channel(1);
    stalled_queue.try_send("backlog".to_string()).unwrap();
    hub.register_queue(stalled_queue).await.unwrap();
    let (_, mut first) = hub.register().await.unwrap();
    let (_, mut second) = hub.register().await.unwrap();
    assert_eq!(hub.client_count().await.unwrap(), 3);

    hub.broadcast("M").await.unwrap();

    assert_eq!(first.recv().await.as_deref(), Some("M"));
    assert_eq!(second.recv().await.as_deref(), Some("M"));
    assert_eq!(hub.client_count().await.unwrap(), 2);
    assert_eq!(stalled.recv().await.as_deref(), Some("backlog"));
    assert_eq!(stalled.recv().await, None);
}

#[tokio::test]
async fn test_refresh_pushes_public_feed() -> Result<()> {
    let (_, service) = memory_service(StubRecommender::Unavailable);
    let writer = author("Tom Lundy");
    service
        .catalog
        .insert_stories(&[
            story(&source("EN-1", "BBC"), &writer, minutes_ago(5)),
            story(&source("EN-2", "CNN"), &writer, minutes_ago(15)),
        ])
        .await?;

    let (_, mut client) = service.hub.register().await?;
    assert_eq!(service.broadcaster.refresh().await?, 2);

    let frame = client.recv().await.expect("a broadcast frame");
    let pushed: Vec<ShortStory> = serde_json::from_str(&frame)?;
    assert_eq!(pushed, service.selector.public_stories("en").await?);
    Ok(())
}

#[tokio::test]
async fn test_store_stories_job_stores_and_broadcasts() -> anyhow::Result<()> {
    let (store, service) = memory_service(StubRecommender::Unavailable);
    let (_, mut client) = service.hub.register().await?;

    let writer = author("Tom Lundy");
    let batch = vec![story(&source("EN-1", "BBC"), &writer, minutes_ago(5))];
    service
        .jobs
        .handle(&Job::new(JobKind::StoreStories, &batch)?)
        .await?;

    assert_eq!(store.count(collections::STORY).await, 1);
    let frame = client.recv().await.expect("a broadcast frame");
    let pushed: Vec<ShortStory> = serde_json::from_str(&frame)?;
    assert_eq!(pushed.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_feedback_and_scraped_url_jobs() -> anyhow::Result<()> {
    let (store, service) = memory_service(StubRecommender::Unavailable);
    let writer = author("Tom Lundy");
    let target = story(&source("EN-1", "BBC"), &writer, minutes_ago(5));
    service.catalog.insert_stories(&[target.clone()]).await?;

    let event = feedback("user-1", target.story_id, FeedbackType::Happy);
    service
        .jobs
        .handle(&Job::new(JobKind::StoreUserFeedback, &event)?)
        .await?;
    assert_eq!(service.catalog.source("EN-1").await?.reputation, Some(0.1));

    let urls = vec![ScrapedUrl {
        published_at: Some(minutes_ago(1)),
        source_name: Some("BBC".to_string()),
        url: Some("https://news.example/a".to_string()),
    }];
    service
        .jobs
        .handle(&Job::new(JobKind::StoreScrapedUrls, &urls)?)
        .await?;
    assert_eq!(store.count(collections::SCRAPED_URL).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_bad_payloads_skip_retry() -> anyhow::Result<()> {
    let (_, service) = memory_service(StubRecommender::Unavailable);

    let garbled = Job {
        kind: JobKind::StoreStories,
        payload: b"{not json".to_vec(),
    };
    let error = service.jobs.handle(&garbled).await.unwrap_err();
    assert!(is_skip_retry(&error));
    assert!(error.downcast_ref::<SkipRetry>().is_some());

    let mut event = feedback("user-1", uuid::Uuid::new_v4(), FeedbackType::Happy);
    event.story_id = "not-a-uuid".to_string();
    let error = service
        .jobs
        .handle(&Job::new(JobKind::StoreUserFeedback, &event)?)
        .await
        .unwrap_err();
    assert!(is_skip_retry(&error));

    // A missing story may still arrive; that one is retryable.
    let missing = feedback("user-1", uuid::Uuid::new_v4(), FeedbackType::Happy);
    let error = service
        .jobs
        .handle(&Job::new(JobKind::StoreUserFeedback, &missing)?)
        .await
        .unwrap_err();
    assert!(!is_skip_retry(&error));
    Ok(())
}

#[tokio::test]
async fn test_socket_relays_to_others_and_delivers_refresh() -> anyhow::Result<()> {
    let (_, service) = memory_service(StubRecommender::Unavailable);
    let writer = author("Tom Lundy");
    service
        .catalog
        .insert_stories(&[story(&source("EN-1", "BBC"), &writer, minutes_ago(5))])
        .await?;
    let addr = spawn_server(service.clone()).await;
    let url = format!("ws://{addr}/ws");

    let (mut alice, _) = connect_async(url.as_str()).await?;
    let (mut bob, _) = connect_async(url.as_str()).await?;
    wait_for_clients(&service.hub, 2).await;

    alice.send(Message::Text(" hello\nworld ".into())).await?;
    assert_eq!(next_text(&mut bob).await.as_deref(), Some("hello world"));

    assert_eq!(service.broadcaster.refresh().await?, 1);
    let expected = serde_json::to_string(&service.selector.public_stories("en").await?)?;
    // The sender never sees its own text, so its first frame is the feed.
    assert_eq!(next_text(&mut alice).await, Some(expected.clone()));
    assert_eq!(next_text(&mut bob).await, Some(expected));

    drop(bob);
    wait_for_clients(&service.hub, 1).await;
    Ok(())
}

#[tokio::test]
async fn test_socket_closes_when_hub_drops_client() -> anyhow::Result<()> {
    let (_, service) = memory_service(StubRecommender::Unavailable);
    let addr = spawn_server(service.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await?;
    wait_for_clients(&service.hub, 1).await;

    // Ids are handed out from zero, so the only client is 0.
    service.hub.unregister(0).await?;
    assert_eq!(next_text(&mut client).await, None);
    wait_for_clients(&service.hub, 0).await;
    Ok(())
}
