use crate::assembler::StoryAssembler;
use crate::read_history::ReadHistory;
use crate::recommender::RecommendationSource;
use crate::store::{collections, Collection, Filter, SharedStore, Sort};
use crate::types::{FeedConfig, Result, ShortStory, StoryRecord, DEFAULT_LANGUAGE};
use chrono::{Duration, Utc};
use interfaces::timestamp;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Decides which stories a user sees: recommender picks when available,
/// otherwise the freshest story of each source, minus what was read lately.
#[derive(Clone)]
pub struct RecommendationSelector {
    stories: Collection<StoryRecord>,
    assembler: StoryAssembler,
    read_history: ReadHistory,
    recommender: Arc<dyn RecommendationSource>,
    freshness_days: i64,
    page_size: usize,
    recommender_budget: StdDuration,
}

impl RecommendationSelector {
    pub fn new(
        store: SharedStore,
        assembler: StoryAssembler,
        read_history: ReadHistory,
        recommender: Arc<dyn RecommendationSource>,
        config: &FeedConfig,
    ) -> Self {
        Self {
            stories: Collection::new(store, collections::STORY),
            assembler,
            read_history,
            recommender,
            freshness_days: config.freshness_days,
            page_size: config.page_size,
            recommender_budget: config.recommender_budget,
        }
    }

    /// The freshest story of each source in the window, newest first.
    pub async fn public_stories(&self, language: &str) -> Result<Vec<ShortStory>> {
        let language = language_or_default(language);
        self.fresh_by_source(self.freshness_filter(language)).await
    }

    pub async fn recommended_stories(&self, user_id: &str, language: &str) -> Result<Vec<ShortStory>> {
        let language = language_or_default(language);
        if user_id.is_empty() {
            return self.public_stories(language).await;
        }

        let exclusion = self.read_exclusion(user_id).await;
        let Some(ranked) = self.recommendations(user_id, language).await else {
            info!("Serving freshness fallback to {}", user_id);
            return self
                .fresh_by_source(self.freshness_filter(language).and(exclusion))
                .await;
        };

        let filter = Filter::eq("language", language)
            .and(Filter::is_in("story_id", ranked.iter().map(ToString::to_string)))
            .and(exclusion);
        let mut records = self.stories.find_many(&filter).await?;

        // The store returns matches in no particular order.
        let rank: HashMap<Uuid, usize> = ranked.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        records.sort_by_key(|record| rank.get(&record.story_id).copied().unwrap_or(usize::MAX));
        records.truncate(self.page_size);

        self.assembler.assemble_short(records).await
    }

    /// One fresh story from `source_id` that is not in `exclude_ids`.
    pub async fn single_story(
        &self,
        exclude_ids: &[Uuid],
        source_id: &str,
        language: &str,
    ) -> Result<Option<ShortStory>> {
        let language = language_or_default(language);
        let filter = self
            .freshness_filter(language)
            .and(Filter::eq("source_id", source_id))
            .and(Filter::not_in("story_id", exclude_ids.iter().map(ToString::to_string)));

        let records = self
            .stories
            .find_sorted(&filter, Some(Sort::desc("published_at")), None)
            .await?;
        Ok(self.assembler.assemble_short(records).await?.into_iter().next())
    }

    fn freshness_filter(&self, language: &str) -> Filter {
        let now = Utc::now();
        Filter::eq("language", language)
            .and(Filter::gte(
                "published_at",
                timestamp::to_value(&(now - Duration::days(self.freshness_days))),
            ))
            .and(Filter::lt("published_at", timestamp::to_value(&now)))
    }

    async fn fresh_by_source(&self, filter: Filter) -> Result<Vec<ShortStory>> {
        let records = self
            .stories
            .find_grouped(&filter, "source_id", Some(Sort::desc("published_at")), None)
            .await?;
        debug!("{} sources with fresh stories", records.len());
        self.assembler.assemble_short(records).await
    }

    // A failed history lookup only costs the exclusion.
    async fn read_exclusion(&self, user_id: &str) -> Filter {
        match self.read_history.recent_story_ids(user_id).await {
            Ok(ids) if !ids.is_empty() => Filter::not_in("story_id", ids.iter().map(ToString::to_string)),
            Ok(_) => Filter::All,
            Err(e) => {
                warn!("Read history unavailable for {}: {}", user_id, e);
                Filter::All
            }
        }
    }

    /// Non-empty recommender picks, or `None` when the fallback should run.
    async fn recommendations(&self, user_id: &str, language: &str) -> Option<Vec<Uuid>> {
        let request = self.recommender.recommendations(user_id, language);
        match tokio::time::timeout(self.recommender_budget, request).await {
            Ok(Ok(ids)) if !ids.is_empty() => Some(ids),
            Ok(Ok(_)) => {
                debug!("Recommender has nothing for {}", user_id);
                None
            }
            Ok(Err(e)) => {
                warn!("Recommender failed for {}: {}", user_id, e);
                None
            }
            Err(_) => {
                warn!("Recommender timed out after {:?} for {}", self.recommender_budget, user_id);
                None
            }
        }
    }
}

pub fn language_or_default(language: &str) -> &str {
    if language.is_empty() {
        DEFAULT_LANGUAGE
    } else {
        language
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_defaults_to_english() {
        assert_eq!(language_or_default(""), "en");
        assert_eq!(language_or_default("fr"), "fr");
    }
}
