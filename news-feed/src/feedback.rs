use crate::favorites::{EntityClass, FavoriteLedgers, LedgerUpdate};
use crate::read_history::ReadHistory;
use crate::stories::StoryCatalog;
use crate::store::{collections, Collection, Filter, SharedStore, Sort};
use crate::types::{FeedbackType, ReadStory, Result, Story, UserFeedback};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const FEEDBACK_REWARD: f64 = 0.1;

/// Listing this user id returns every user's feedback.
pub const ALL_USERS: &str = "defaultmodel";

/// Reputation/relevancy reward of a feedback type.
pub fn reward_for(feedback_type: FeedbackType) -> f64 {
    match feedback_type {
        FeedbackType::Angry => -FEEDBACK_REWARD,
        FeedbackType::Happy | FeedbackType::Shared => FEEDBACK_REWARD,
        _ => 0.0,
    }
}

/// Feedback events, kept as a rolling history for training-data export.
#[derive(Clone)]
pub struct FeedbackLog {
    entries: Collection<UserFeedback>,
    limit: usize,
}

impl FeedbackLog {
    pub fn new(store: SharedStore, limit: usize) -> Self {
        Self {
            entries: Collection::new(store, collections::USER_FEEDBACK),
            limit,
        }
    }

    /// Duplicates accumulate.
    pub async fn record(&self, event: &UserFeedback) -> Result<()> {
        self.entries.save(event).await?;
        Ok(())
    }

    /// Newest first, capped.
    pub async fn list(&self, user_id: &str) -> Result<Vec<UserFeedback>> {
        let filter = if user_id == ALL_USERS {
            Filter::All
        } else {
            Filter::eq("user_id", user_id)
        };
        self.entries
            .find_sorted(&filter, Some(Sort::desc("feedback_datetime")), Some(self.limit))
            .await
    }
}

/// What one feedback event changed. Failed ledger or reputation writes are
/// counted, not raised.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedbackOutcome {
    pub reward: f64,
    pub counter_updated: bool,
    pub ledger_updates: usize,
    pub ledgers_created: usize,
    pub reputation_updates: usize,
    pub failures: usize,
}

struct LedgerTarget {
    class: EntityClass,
    identifier: String,
    value: String,
}

/// Turns a feedback event into read-history, counter, favorite-ledger and
/// reputation updates.
#[derive(Clone)]
pub struct FeedbackPropagator {
    catalog: StoryCatalog,
    favorites: FavoriteLedgers,
    read_history: ReadHistory,
    log: FeedbackLog,
}

impl FeedbackPropagator {
    pub fn new(catalog: StoryCatalog, favorites: FavoriteLedgers, read_history: ReadHistory, log: FeedbackLog) -> Self {
        Self {
            catalog,
            favorites,
            read_history,
            log,
        }
    }

    pub fn log(&self) -> &FeedbackLog {
        &self.log
    }

    /// An unparseable story id aborts before anything is written. After
    /// that, receipt and log failures are logged and skipped, a missing story
    /// is returned as an error, and ledger/reputation failures only show up
    /// in the outcome. The updates are not transactional.
    pub async fn feedback_received(&self, event: &UserFeedback) -> Result<FeedbackOutcome> {
        let story_id = Uuid::parse_str(&event.story_id)?;
        info!("Feedback {} from {} on {}", event.feedback_type, event.user_id, story_id);

        let receipt = ReadStory {
            user_id: event.user_id.clone(),
            story_id: story_id.to_string(),
            read_time: Utc::now(),
        };
        if let Err(e) = self.read_history.add(&receipt).await {
            warn!("Failed to record read receipt for {}: {}", story_id, e);
        }
        if let Err(e) = self.log.record(event).await {
            warn!("Failed to log feedback for {}: {}", story_id, e);
        }

        let story = self.catalog.story_by_id(&event.story_id).await.map_err(|e| {
            error!("Feedback on unavailable story {}: {}", story_id, e);
            e
        })?;

        let mut outcome = FeedbackOutcome::default();
        match self.catalog.update_feedback_counts(story_id, event.feedback_type).await {
            Ok(updated) => outcome.counter_updated = updated,
            Err(e) => warn!("Failed to update {} counter on {}: {}", event.feedback_type, story_id, e),
        }

        let reward = reward_for(event.feedback_type);
        outcome.reward = reward;
        if reward == 0.0 {
            return Ok(outcome);
        }

        let language = story.language_or_default().to_string();
        let targets = ledger_targets(&story);
        let updates = targets.iter().map(|target| {
            self.favorites.update_from_story(
                &event.user_id,
                &target.identifier,
                &target.value,
                reward,
                target.class,
                &language,
            )
        });
        for (target, result) in targets.iter().zip(join_all(updates).await) {
            match result {
                Ok(update) => {
                    outcome.ledger_updates += 1;
                    if update == LedgerUpdate::Created {
                        outcome.ledgers_created += 1;
                    }
                }
                Err(e) => {
                    outcome.failures += 1;
                    warn!("Failed to update {:?} favorite {}: {}", target.class, target.identifier, e);
                }
            }
        }

        let (source, author) = tokio::join!(
            self.catalog.update_source_reputation(&story.source.source_id, reward),
            self.catalog.update_author_reputation(story.author.author_id, reward),
        );
        for (kind, result) in [("source", source), ("author", author)] {
            match result {
                Ok(()) => outcome.reputation_updates += 1,
                Err(e) => {
                    outcome.failures += 1;
                    warn!("Failed to update {} reputation for story {}: {}", kind, story_id, e);
                }
            }
        }

        debug!("Feedback on {} applied: {:?}", story_id, outcome);
        Ok(outcome)
    }
}

/// Every distinct keyword and entity of the story, plus its source and author.
fn ledger_targets(story: &Story) -> Vec<LedgerTarget> {
    let mut targets = Vec::new();

    let mut seen_keywords = HashSet::new();
    for keyword in &story.keywords {
        if seen_keywords.insert(keyword.keyword.text.as_str()) {
            targets.push(LedgerTarget {
                class: EntityClass::Keyword,
                identifier: keyword.keyword.text.clone(),
                value: keyword.keyword.text.clone(),
            });
        }
    }

    let mut seen_entities = HashSet::new();
    for entity in &story.entities {
        if seen_entities.insert(entity.entity.links.as_str()) {
            targets.push(LedgerTarget {
                class: EntityClass::Entity,
                identifier: entity.entity.links.clone(),
                value: entity.entity.text.clone(),
            });
        }
    }

    targets.push(LedgerTarget {
        class: EntityClass::Source,
        identifier: story.source.source_id.clone(),
        value: story.source.name.clone().unwrap_or_else(|| story.source.source_id.clone()),
    });
    targets.push(LedgerTarget {
        class: EntityClass::Author,
        identifier: story.author.author_id.to_string(),
        value: story.author.name.clone().unwrap_or_default(),
    });
    targets
}
