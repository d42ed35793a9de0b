use crate::assembler::StoryAssembler;
use crate::store::{collections, Collection, Document, Filter, SharedStore};
use crate::types::{
    Author, Entity, FeedConfig, FeedbackType, Keyword, NewsError, Result, ScrapedUrl, Source, Story,
    StoryRecord,
};
use chrono::{DateTime, Duration, Utc};
use interfaces::timestamp;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Story fields only feedback writes.
pub const COUNTER_FIELDS: &[&str] = &[
    "read_count",
    "shared_count",
    "angry_count",
    "cry_count",
    "neutral_count",
    "smile_count",
    "happy_count",
];

/// Counts from one ingested batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InsertSummary {
    pub stories: u64,
    pub new_authors: u64,
    pub new_sources: u64,
    pub new_keywords: u64,
    pub new_entities: u64,
    pub expired: u64,
}

/// Story storage: ingestion, expiry, lookups and counter/reputation updates.
#[derive(Clone)]
pub struct StoryCatalog {
    stories: Collection<StoryRecord>,
    authors: Collection<Author>,
    sources: Collection<Source>,
    keywords: Collection<Keyword>,
    entities: Collection<Entity>,
    scraped_urls: Collection<ScrapedUrl>,
    assembler: StoryAssembler,
    retention_days: i64,
    scraped_url_days: i64,
}

impl StoryCatalog {
    pub fn new(store: SharedStore, assembler: StoryAssembler, config: &FeedConfig) -> Self {
        Self {
            stories: Collection::new(store.clone(), collections::STORY),
            authors: Collection::new(store.clone(), collections::AUTHOR),
            sources: Collection::new(store.clone(), collections::SOURCE),
            keywords: Collection::new(store.clone(), collections::KEYWORD),
            entities: Collection::new(store.clone(), collections::ENTITY),
            scraped_urls: Collection::new(store, collections::SCRAPED_URL),
            assembler,
            retention_days: config.retention_days,
            scraped_url_days: config.scraped_url_days,
        }
    }

    pub fn records(&self) -> &Collection<StoryRecord> {
        &self.stories
    }

    pub fn assembler(&self) -> &StoryAssembler {
        &self.assembler
    }

    /// Store a batch of assembled stories: register the authors, sources,
    /// keywords and entities not seen before, upsert the records, then
    /// expire old stories.
    pub async fn insert_stories(&self, stories: &[Story]) -> Result<InsertSummary> {
        let cutoff = self.retention_cutoff();
        let live: Vec<&Story> = stories
            .iter()
            .filter(|story| story.published_at.map_or(true, |published| published > cutoff))
            .collect();
        if live.len() < stories.len() {
            debug!("Skipping {} stories already past retention", stories.len() - live.len());
        }
        if live.is_empty() {
            info!("No stories to insert");
            return Ok(InsertSummary::default());
        }

        let authors: Vec<Author> = live.iter().map(|story| story.author.clone()).collect();
        let sources: Vec<Source> = live.iter().map(|story| story.source.clone()).collect();
        let entities: Vec<Entity> = live
            .iter()
            .flat_map(|story| story.entities.iter().map(|entity| entity.entity.clone()))
            .collect();

        let mut summary = InsertSummary {
            new_authors: insert_new(&self.authors, "author_id", authors).await?,
            new_sources: insert_new(&self.sources, "source_id", sources).await?,
            new_keywords: self.insert_new_keywords(&live).await?,
            new_entities: insert_new(&self.entities, "links", entities).await?,
            ..InsertSummary::default()
        };

        summary.stories = self.upsert_records(&live).await?;
        summary.expired = self.remove_old_stories().await?;

        info!(
            "Stored {} stories ({} new authors, {} new keywords, {} new entities, {} expired)",
            summary.stories, summary.new_authors, summary.new_keywords, summary.new_entities, summary.expired
        );
        Ok(summary)
    }

    // Keywords are keyed by the language of the story they appear in.
    async fn insert_new_keywords(&self, stories: &[&Story]) -> Result<u64> {
        let mut candidates: HashMap<String, Keyword> = HashMap::new();
        for story in stories {
            let language = story.language_or_default();
            for keyword in &story.keywords {
                let keyword = Keyword {
                    text: keyword.keyword.text.clone(),
                    language: Some(language.to_string()),
                };
                if let Some(identity) = keyword.identity() {
                    candidates.entry(identity).or_insert(keyword);
                }
            }
        }
        if candidates.is_empty() {
            return Ok(0);
        }

        let texts: HashSet<&str> = candidates.values().map(|keyword| keyword.text.as_str()).collect();
        let languages: HashSet<&str> = candidates.values().filter_map(|keyword| keyword.language.as_deref()).collect();
        let existing: HashSet<String> = self
            .keywords
            .find_many(&Filter::is_in("text", texts).and(Filter::is_in("language", languages)))
            .await?
            .iter()
            .filter_map(Document::identity)
            .collect();

        let fresh: Vec<Keyword> = candidates
            .into_iter()
            .filter(|(identity, _)| !existing.contains(identity))
            .map(|(_, keyword)| keyword)
            .collect();
        self.keywords.save_many(&fresh).await
    }

    // Stored stories are merged without their counters; feedback owns those.
    async fn upsert_records(&self, stories: &[&Story]) -> Result<u64> {
        let records: Vec<StoryRecord> = stories.iter().map(|story| StoryRecord::from(*story)).collect();
        let ids: Vec<String> = records.iter().map(|record| record.story_id.to_string()).collect();
        let stored: HashSet<String> = self
            .stories
            .distinct(&Filter::is_in("story_id", ids), "story_id")
            .await?
            .into_iter()
            .collect();

        let (existing, fresh): (Vec<StoryRecord>, Vec<StoryRecord>) = records
            .into_iter()
            .partition(|record| stored.contains(&record.story_id.to_string()));
        let inserted = self.stories.save_many(&fresh).await?;
        let updated = self.stories.save_many_omitting(&existing, COUNTER_FIELDS).await?;
        Ok(inserted + updated)
    }

    fn retention_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - Duration::days(self.retention_days)
    }

    pub async fn remove_old_stories(&self) -> Result<u64> {
        let cutoff = self.retention_cutoff();
        let removed = self
            .stories
            .delete_many(&Filter::lte("published_at", timestamp::to_value(&cutoff)))
            .await?;
        if removed > 0 {
            info!("Removed {} stories published before {}", removed, cutoff);
        }
        Ok(removed)
    }

    pub async fn story_by_id(&self, story_id: &str) -> Result<Story> {
        let id = Uuid::parse_str(story_id)?;
        let record = self.stories.find_one(&Filter::eq("story_id", id.to_string())).await?;
        self.assembler
            .assemble_full(vec![record])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NewsError::not_found(collections::STORY))
    }

    /// Bump the story counter for a feedback type. Read and shared have no
    /// counter; `Ok(false)` for those.
    pub async fn update_feedback_counts(&self, story_id: Uuid, feedback_type: FeedbackType) -> Result<bool> {
        let Some(field) = counter_field(feedback_type) else {
            return Ok(false);
        };
        let matched = self
            .stories
            .increment(&Filter::eq("story_id", story_id.to_string()), field, 1.0)
            .await?;
        if matched == 0 {
            return Err(NewsError::not_found(collections::STORY));
        }
        Ok(true)
    }

    pub async fn update_source_reputation(&self, source_id: &str, reward: f64) -> Result<()> {
        let matched = self
            .sources
            .increment(&Filter::eq("source_id", source_id), "reputation", reward)
            .await?;
        if matched == 0 {
            return Err(NewsError::not_found(collections::SOURCE));
        }
        debug!("Source {} reputation {:+}", source_id, reward);
        Ok(())
    }

    pub async fn update_author_reputation(&self, author_id: Uuid, reward: f64) -> Result<()> {
        let matched = self
            .authors
            .increment(&Filter::eq("author_id", author_id.to_string()), "reputation", reward)
            .await?;
        if matched == 0 {
            return Err(NewsError::not_found(collections::AUTHOR));
        }
        debug!("Author {} reputation {:+}", author_id, reward);
        Ok(())
    }

    pub async fn source(&self, source_id: &str) -> Result<Source> {
        self.sources.find_one(&Filter::eq("source_id", source_id)).await
    }

    pub async fn author(&self, author_id: Uuid) -> Result<Author> {
        self.authors.find_one(&Filter::eq("author_id", author_id.to_string())).await
    }

    pub async fn add_scraped_urls(&self, urls: &[ScrapedUrl]) -> Result<u64> {
        let stored = self.scraped_urls.save_many(urls).await?;
        info!("Stored {} scraped urls", stored);
        Ok(stored)
    }

    /// Urls scraped from a source within the recent window.
    pub async fn scraped_urls_by_source(&self, source_name: &str) -> Result<Vec<ScrapedUrl>> {
        let now = Utc::now();
        let filter = Filter::eq("source_name", source_name)
            .and(Filter::gte(
                "published_at",
                timestamp::to_value(&(now - Duration::days(self.scraped_url_days))),
            ))
            .and(Filter::lt("published_at", timestamp::to_value(&now)));
        self.scraped_urls.find_many(&filter).await
    }
}

pub fn counter_field(feedback_type: FeedbackType) -> Option<&'static str> {
    match feedback_type {
        FeedbackType::Angry => Some("angry_count"),
        FeedbackType::Cry => Some("cry_count"),
        FeedbackType::Happy => Some("happy_count"),
        FeedbackType::Neutral => Some("neutral_count"),
        FeedbackType::Smile => Some("smile_count"),
        FeedbackType::Read | FeedbackType::Shared => None,
    }
}

/// Save the documents whose `key` value is not stored yet.
async fn insert_new<T: Document>(
    collection: &Collection<T>,
    key: &str,
    documents: Vec<T>,
) -> Result<u64> {
    let mut candidates: HashMap<String, T> = HashMap::new();
    for document in documents {
        if let Some(identity) = document.identity() {
            candidates.entry(identity).or_insert(document);
        }
    }
    if candidates.is_empty() {
        return Ok(0);
    }

    let existing: HashSet<String> = collection
        .distinct(&Filter::is_in(key, candidates.keys().cloned()), key)
        .await?
        .into_iter()
        .collect();
    let fresh: Vec<T> = candidates
        .into_iter()
        .filter(|(identity, _)| !existing.contains(identity))
        .map(|(_, document)| document)
        .collect();

    debug!("Inserting {} new documents into {}", fresh.len(), collection.name());
    collection.save_many(&fresh).await
}
