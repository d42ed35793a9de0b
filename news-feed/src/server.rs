//! HTTP surface: the feeds, story and personalization lookups, ranking
//! exports and the live WebSocket channel.

use crate::selector::language_or_default;
use crate::service::NewsService;
use crate::socket;
use crate::favorites::Personalization;
use crate::ranking::RankingData;
use crate::types::{NewsError, ScrapedUrl, ShortStory, Story, UserFeedback};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SingleStoryParams {
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub language: String,
    /// Comma-separated story ids.
    #[serde(default)]
    pub exclude: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SourceParams {
    #[serde(default)]
    pub source_name: String,
}

pub fn build_router(service: NewsService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/stories/public", get(public_stories))
        .route("/stories/recommended", get(recommended_stories))
        .route("/stories/single", get(single_story))
        .route("/stories/{story_id}", get(story_by_id))
        .route("/users/{user_id}/personalization", get(personalization))
        .route("/users/{user_id}/feedback", get(feedback_list))
        .route("/ranking/tf-index", get(tf_index))
        .route("/ranking/training-data/{user_id}", get(training_data))
        .route("/scraped-urls", get(scraped_urls))
        .with_state(service)
}

pub async fn serve(service: NewsService, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{} (WebSocket at ws://{}/ws)", addr, addr);
    axum::serve(listener, build_router(service)).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(service): State<NewsService>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| socket::serve_client(socket, service.hub))
}

async fn health_check(State(service): State<NewsService>) -> Json<Value> {
    let clients = service.hub.client_count().await.ok();
    let status = if clients.is_some() { "ok" } else { "degraded" };
    Json(json!({
        "status": status,
        "clients": clients,
    }))
}

async fn public_stories(
    State(service): State<NewsService>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<ShortStory>>, StatusCode> {
    service
        .selector
        .public_stories(&params.language)
        .await
        .map(Json)
        .map_err(status_for)
}

async fn recommended_stories(
    State(service): State<NewsService>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<ShortStory>>, StatusCode> {
    service
        .selector
        .recommended_stories(&params.user_id, &params.language)
        .await
        .map(Json)
        .map_err(status_for)
}

async fn single_story(
    State(service): State<NewsService>,
    Query(params): Query<SingleStoryParams>,
) -> Result<Json<Option<ShortStory>>, StatusCode> {
    let exclude = parse_ids(&params.exclude).map_err(status_for)?;
    service
        .selector
        .single_story(&exclude, &params.source_id, &params.language)
        .await
        .map(Json)
        .map_err(status_for)
}

async fn story_by_id(
    State(service): State<NewsService>,
    Path(story_id): Path<String>,
) -> Result<Json<Story>, StatusCode> {
    service.catalog.story_by_id(&story_id).await.map(Json).map_err(status_for)
}

async fn personalization(
    State(service): State<NewsService>,
    Path(user_id): Path<String>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Personalization>, StatusCode> {
    service
        .favorites
        .personalization(&user_id, language_or_default(&params.language))
        .await
        .map(Json)
        .map_err(status_for)
}

async fn feedback_list(
    State(service): State<NewsService>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<UserFeedback>>, StatusCode> {
    service.feedback.log().list(&user_id).await.map(Json).map_err(status_for)
}

async fn tf_index(
    State(service): State<NewsService>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<RankingData>>, StatusCode> {
    service
        .ranking
        .tf_index(language_or_default(&params.language))
        .await.map(Json).map_err(status_for)
}

async fn training_data(
    State(service): State<NewsService>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<RankingData>>, StatusCode> {
    service.ranking.training_data(&user_id).await.map(Json).map_err(status_for)
}

async fn scraped_urls(
    State(service): State<NewsService>,
    Query(params): Query<SourceParams>,
) -> Result<Json<Vec<ScrapedUrl>>, StatusCode> {
    service
        .catalog
        .scraped_urls_by_source(&params.source_name)
        .await
        .map(Json)
        .map_err(status_for)
}

fn parse_ids(ids: &str) -> Result<Vec<Uuid>, NewsError> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| Uuid::parse_str(id).map_err(NewsError::from))
        .collect()
}

fn status_for(e: NewsError) -> StatusCode {
    if e.is_validation() {
        return StatusCode::BAD_REQUEST;
    }
    if e.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    error!("Feed request failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}
