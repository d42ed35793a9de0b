use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp;

pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub author_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    /// Unset until the first feedback reward touches this author.
    #[serde(default)]
    pub reputation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub home_page_url: Option<String>,
    #[serde(default)]
    pub rank_in_alexa: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub rss_feed: Option<String>,
    #[serde(default)]
    pub reputation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub links: String,
}

/// Keyword reference as stored on a story record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRef {
    pub text: String,
    #[serde(default)]
    pub frequency: i64,
}

/// Entity reference as stored on a story record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub links: String,
    #[serde(default)]
    pub frequency: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordInStory {
    pub keyword: Keyword,
    #[serde(default)]
    pub frequency: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInStory {
    pub entity: Entity,
    #[serde(default)]
    pub frequency: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryCounters {
    #[serde(default)]
    pub read_count: i64,
    #[serde(default)]
    pub shared_count: i64,
    #[serde(default)]
    pub angry_count: i64,
    #[serde(default)]
    pub cry_count: i64,
    #[serde(default)]
    pub neutral_count: i64,
    #[serde(default)]
    pub smile_count: i64,
    #[serde(default)]
    pub happy_count: i64,
}

/// Normalized story as stored: related entities are referenced by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub story_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub author_id: Option<Uuid>,
    #[serde(default)]
    pub keywords: Vec<KeywordRef>,
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    #[serde(flatten)]
    pub counters: StoryCounters,
}

/// Story with author, source, keywords and entities joined in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub story_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub published_at: Option<DateTime<Utc>>,
    pub source: Source,
    pub author: Author,
    #[serde(default)]
    pub keywords: Vec<KeywordInStory>,
    #[serde(default)]
    pub entities: Vec<EntityInStory>,
    #[serde(flatten)]
    pub counters: StoryCounters,
}

impl Story {
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }
}

impl From<&Story> for StoryRecord {
    fn from(story: &Story) -> Self {
        Self {
            story_id: story.story_id,
            title: story.title.clone(),
            body: story.body.clone(),
            summary: story.summary.clone(),
            url: story.url.clone(),
            images: story.images.clone(),
            language: story.language.clone(),
            published_at: story.published_at,
            source_id: Some(story.source.source_id.clone()),
            author_id: Some(story.author.author_id),
            keywords: story
                .keywords
                .iter()
                .map(|keyword| KeywordRef {
                    text: keyword.keyword.text.clone(),
                    frequency: keyword.frequency,
                })
                .collect(),
            entities: story
                .entities
                .iter()
                .map(|entity| EntityRef {
                    links: entity.entity.links.clone(),
                    frequency: entity.frequency,
                })
                .collect(),
            counters: story.counters.clone(),
        }
    }
}

/// Flattened summary of a story for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortStory {
    pub story_id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub source_id: String,
    #[serde(default)]
    pub author: Option<String>,
    pub author_id: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub entity_links: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Read,
    Shared,
    Angry,
    Cry,
    Neutral,
    Smile,
    Happy,
}

impl FeedbackType {
    pub const ALL: [FeedbackType; 7] = [
        FeedbackType::Read,
        FeedbackType::Shared,
        FeedbackType::Angry,
        FeedbackType::Cry,
        FeedbackType::Neutral,
        FeedbackType::Smile,
        FeedbackType::Happy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackType::Read => "read",
            FeedbackType::Shared => "shared",
            FeedbackType::Angry => "angry",
            FeedbackType::Cry => "cry",
            FeedbackType::Neutral => "neutral",
            FeedbackType::Smile => "smile",
            FeedbackType::Happy => "happy",
        }
    }

    /// Relevancy a single event of this type contributes to training data.
    pub fn relevancy_delta(self) -> f64 {
        match self {
            FeedbackType::Read => 1.0,
            FeedbackType::Shared => 5.0,
            FeedbackType::Angry => -5.0,
            FeedbackType::Cry => -2.0,
            FeedbackType::Neutral => 0.0,
            FeedbackType::Smile => 2.0,
            FeedbackType::Happy => 5.0,
        }
    }
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFeedback {
    pub user_id: String,
    pub story_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    #[serde(with = "timestamp")]
    pub feedback_datetime: DateTime<Utc>,
    pub feedback_type: FeedbackType,
}

/// Read receipt. Append-only; duplicates are harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadStory {
    pub user_id: String,
    pub story_id: String,
    #[serde(with = "timestamp")]
    pub read_time: DateTime<Utc>,
}

/// Per-(user, identifier, language) affinity record of one favorite ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub identifier: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_recommended: bool,
    #[serde(default)]
    pub is_added: bool,
    #[serde(default)]
    pub relevancy_rate: f64,
    #[serde(default)]
    pub language: String,
}

impl Favorite {
    /// A ledger entry created lazily by feedback rather than by the user.
    pub fn recommended(user_id: &str, identifier: &str, value: &str, relevancy_rate: f64, language: &str) -> Self {
        Self {
            id: None,
            user_id: user_id.to_owned(),
            identifier: identifier.to_owned(),
            value: value.to_owned(),
            is_favorite: false,
            is_deleted: false,
            is_recommended: true,
            is_added: false,
            relevancy_rate,
            language: language.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedUrl {
    #[serde(default, with = "timestamp::option")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}
