#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use news_feed::store::{collections, DocumentStore, Filter, MemoryStore, SharedStore, Sort, ID_FIELD};
use news_feed::types::*;
use news_feed::{HubHandle, NewsService, RecommendationSource};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

pub fn source(source_id: &str, name: &str) -> Source {
    Source {
        source_id: source_id.to_string(),
        name: Some(name.to_string()),
        home_page_url: None,
        rank_in_alexa: Some(1048),
        language: Some("en".to_string()),
        rss_feed: None,
        reputation: None,
    }
}

pub fn author(name: &str) -> Author {
    Author {
        author_id: Uuid::new_v4(),
        name: Some(name.to_string()),
        reputation: None,
    }
}

pub fn keyword(text: &str, frequency: i64) -> KeywordInStory {
    KeywordInStory {
        keyword: Keyword {
            text: text.to_string(),
            language: Some("en".to_string()),
        },
        frequency,
    }
}

pub fn entity(text: &str, links: &str, frequency: i64) -> EntityInStory {
    EntityInStory {
        entity: Entity {
            text: text.to_string(),
            kind: Some("ORG".to_string()),
            links: links.to_string(),
        },
        frequency,
    }
}

pub fn story(source: &Source, author: &Author, published_at: DateTime<Utc>) -> Story {
    let story_id = Uuid::new_v4();
    Story {
        story_id,
        title: Some(format!("Story {}", story_id)),
        body: Some("Body".to_string()),
        summary: Some("Summary".to_string()),
        url: Some(format!("https://news.example/{}", story_id)),
        images: vec![format!("https://news.example/{}.jpg", story_id)],
        language: Some("en".to_string()),
        published_at: Some(published_at),
        source: source.clone(),
        author: author.clone(),
        keywords: vec![keyword("apple", 2)],
        entities: vec![entity("Apple", "https://en.wikipedia.org/wiki/Apple_Inc.", 1)],
        counters: StoryCounters::default(),
    }
}

pub fn feedback(user_id: &str, story_id: Uuid, feedback_type: FeedbackType) -> UserFeedback {
    UserFeedback {
        user_id: user_id.to_string(),
        story_id: story_id.to_string(),
        search_term: None,
        feedback_datetime: Utc::now(),
        feedback_type,
    }
}

/// Fixed answer from the recommender.
pub enum StubRecommender {
    Ids(Vec<Uuid>),
    Unavailable,
    Slow,
}

#[async_trait]
impl RecommendationSource for StubRecommender {
    async fn recommendations(&self, _user_id: &str, _language: &str) -> Result<Vec<Uuid>> {
        match self {
            StubRecommender::Ids(ids) => Ok(ids.clone()),
            StubRecommender::Unavailable => Err(NewsError::UpstreamUnavailable("stub".to_string())),
            StubRecommender::Slow => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Memory store whose operations on selected collections fail.
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
}

impl FailingStore {
    pub fn fail(&self, collection: &str) {
        self.failing.lock().unwrap().insert(collection.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, collection: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(collection) {
            return Err(NewsError::Store(format!("{} unavailable", collection)));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get_sorted(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        self.check(collection)?;
        self.inner.get_sorted(collection, filter, sort, limit).await
    }

    async fn get_grouped(
        &self,
        collection: &str,
        filter: &Filter,
        group_key: &str,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        self.check(collection)?;
        self.inner.get_grouped(collection, filter, group_key, sort, limit).await
    }

    async fn get_distinct(&self, collection: &str, filter: &Filter, field: &str) -> Result<Vec<String>> {
        self.check(collection)?;
        self.inner.get_distinct(collection, filter, field).await
    }

    async fn upsert_one(&self, collection: &str, identity: Option<String>, document: Value) -> Result<String> {
        self.check(collection)?;
        self.inner.upsert_one(collection, identity, document).await
    }

    async fn upsert_many(&self, collection: &str, documents: Vec<(Option<String>, Value)>) -> Result<u64> {
        self.check(collection)?;
        self.inner.upsert_many(collection, documents).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.check(collection)?;
        self.inner.delete_many(collection, filter).await
    }

    async fn increment(&self, collection: &str, filter: &Filter, field: &str, delta: f64) -> Result<u64> {
        self.check(collection)?;
        self.inner.increment(collection, filter, field, delta).await
    }
}

/// Memory store that bumps a story counter right before the next story
/// write lands, the way a concurrent feedback increment would.
#[derive(Default)]
pub struct InterleavingStore {
    inner: MemoryStore,
    pending: Mutex<Option<&'static str>>,
}

impl InterleavingStore {
    pub fn increment_on_next_story_write(&self, field: &'static str) {
        *self.pending.lock().unwrap() = Some(field);
    }
}

#[async_trait]
impl DocumentStore for InterleavingStore {
    async fn get_sorted(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        self.inner.get_sorted(collection, filter, sort, limit).await
    }

    async fn get_grouped(
        &self,
        collection: &str,
        filter: &Filter,
        group_key: &str,
        sort: Option<&Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        self.inner.get_grouped(collection, filter, group_key, sort, limit).await
    }

    async fn get_distinct(&self, collection: &str, filter: &Filter, field: &str) -> Result<Vec<String>> {
        self.inner.get_distinct(collection, filter, field).await
    }

    async fn upsert_one(&self, collection: &str, identity: Option<String>, document: Value) -> Result<String> {
        self.inner.upsert_one(collection, identity, document).await
    }

    async fn upsert_many(&self, collection: &str, documents: Vec<(Option<String>, Value)>) -> Result<u64> {
        if collection == collections::STORY {
            let pending = self.pending.lock().unwrap().take();
            if let Some(field) = pending {
                let ids: Vec<String> = documents.iter().filter_map(|(id, _)| id.clone()).collect();
                self.inner
                    .increment(collection, &Filter::is_in(ID_FIELD, ids), field, 1.0)
                    .await?;
            }
        }
        self.inner.upsert_many(collection, documents).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.inner.delete_many(collection, filter).await
    }

    async fn increment(&self, collection: &str, filter: &Filter, field: &str, delta: f64) -> Result<u64> {
        self.inner.increment(collection, filter, field, delta).await
    }
}

pub fn service_with(store: SharedStore, config: FeedConfig, recommender: StubRecommender) -> NewsService {
    init_tracing();
    let (hub, _task) = HubHandle::spawn(config.client_queue_capacity);
    NewsService::new(store, &config, Arc::new(recommender), hub)
}

pub fn memory_service(recommender: StubRecommender) -> (Arc<MemoryStore>, NewsService) {
    let store = Arc::new(MemoryStore::new());
    let service = service_with(store.clone(), FeedConfig::default(), recommender);
    (store, service)
}

/// Serve the full router on an ephemeral local port.
pub async fn spawn_server(service: NewsService) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, news_feed::server::build_router(service)).await });
    addr
}

/// Poll until the hub reports `expected` clients.
pub async fn wait_for_clients(hub: &HubHandle, expected: usize) {
    let waiting = async {
        while hub.client_count().await.unwrap() != expected {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(5), waiting)
        .await
        .expect("hub client count");
}
