use serde::{Deserialize, Serialize};
use std::time::Duration;

// Use the interfaces crate for core types
pub use interfaces::defs::{
    Author, Entity, EntityInStory, EntityRef, Favorite, FeedbackType, Keyword, KeywordInStory,
    KeywordRef, ReadStory, ScrapedUrl, ShortStory, Source, Story, StoryCounters, StoryRecord,
    UserFeedback, DEFAULT_LANGUAGE,
};
pub use interfaces::jobs::{Job, JobHandler, JobKind};

/// How the entity resolver treats a failed lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Any failed lookup fails the whole batch.
    Strict,
    /// A failed lookup yields an empty category; affected stories are dropped later.
    #[default]
    Lenient,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub resolve_mode: ResolveMode,
    pub freshness_days: i64,
    pub read_window_days: i64,
    pub page_size: usize,
    pub retention_days: i64,
    pub scraped_url_days: i64,
    pub favorite_item_count: usize,
    pub feedback_list_limit: usize,
    pub feed_language: String,
    pub recommender_budget: Duration,
    pub broadcast_interval: Duration,
    pub client_queue_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            resolve_mode: ResolveMode::Lenient,
            freshness_days: 1,
            read_window_days: 1,
            page_size: 12,
            retention_days: 90,
            scraped_url_days: 3,
            favorite_item_count: 10,
            feedback_list_limit: 200,
            feed_language: DEFAULT_LANGUAGE.to_string(),
            recommender_budget: Duration::from_secs(5),
            broadcast_interval: Duration::from_secs(60 * 60),
            client_queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: "news-feed/0.1".to_string(),
            timeout: Duration::from_secs(3),
            max_retries: 1,
            retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    #[error("No matching document in {collection}")]
    NotFound { collection: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),

    #[error("Recommender unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Broadcast hub is not running")]
    HubClosed,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NewsError {
    pub fn not_found(collection: &str) -> Self {
        NewsError::NotFound {
            collection: collection.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NewsError::NotFound { .. })
    }

    /// Malformed input from the caller, as opposed to a storage or upstream fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, NewsError::Validation(_) | NewsError::InvalidId(_))
    }
}

pub type Result<T> = std::result::Result<T, NewsError>;
