use crate::feedback::FeedbackLog;
use crate::stories::StoryCatalog;
use crate::store::Filter;
use crate::types::{Result, Story};
use chrono::{DateTime, Duration, Utc};
use interfaces::timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One training/index row for the ranking model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingData {
    pub story_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevancy_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<i64>,
    pub story_title: Option<String>,
    pub source_alexa_rank: Option<i64>,
    pub read_count: i64,
    pub shared_count: i64,
    pub angry_count: i64,
    pub cry_count: i64,
    pub neutral_count: i64,
    pub smile_count: i64,
    pub happy_count: i64,
    pub source_id: String,
    pub author_id: String,
    pub most_frequent_keyword: String,
    pub most_frequent_entity: String,
}

impl RankingData {
    /// `None` unless the story has at least one keyword and one entity.
    pub fn from_story(story: &Story) -> Option<Self> {
        let keyword = most_frequent(&story.keywords, |keyword| keyword.frequency)?;
        let entity = most_frequent(&story.entities, |entity| entity.frequency)?;

        Some(Self {
            story_id: story.story_id.to_string(),
            user_id: None,
            relevancy_rate: None,
            time_stamp: None,
            story_title: story.title.clone(),
            source_alexa_rank: story.source.rank_in_alexa,
            read_count: story.counters.read_count,
            shared_count: story.counters.shared_count,
            angry_count: story.counters.angry_count,
            cry_count: story.counters.cry_count,
            neutral_count: story.counters.neutral_count,
            smile_count: story.counters.smile_count,
            happy_count: story.counters.happy_count,
            source_id: story.source.source_id.clone(),
            author_id: story.author.author_id.to_string(),
            most_frequent_keyword: keyword.keyword.text.clone(),
            most_frequent_entity: entity.entity.links.clone(),
        })
    }
}

/// The element with the highest frequency; the earliest one wins a tie.
pub fn most_frequent<T>(items: &[T], frequency: impl Fn(&T) -> i64) -> Option<&T> {
    let mut best: Option<&T> = None;
    for item in items {
        if best.map_or(true, |current| frequency(item) > frequency(current)) {
            best = Some(item);
        }
    }
    best
}

/// Exports story features and per-user relevancy for the ranking model.
#[derive(Clone)]
pub struct RankingExport {
    catalog: StoryCatalog,
    log: FeedbackLog,
    freshness_days: i64,
}

impl RankingExport {
    pub fn new(catalog: StoryCatalog, log: FeedbackLog, freshness_days: i64) -> Self {
        Self {
            catalog,
            log,
            freshness_days,
        }
    }

    /// Feature rows for the fresh stories of a language.
    pub async fn tf_index(&self, language: &str) -> Result<Vec<RankingData>> {
        let now = Utc::now();
        let filter = Filter::eq("language", language)
            .and(Filter::gte(
                "published_at",
                timestamp::to_value(&(now - Duration::days(self.freshness_days))),
            ))
            .and(Filter::lt("published_at", timestamp::to_value(&now)));

        let records = self.catalog.records().find_many(&filter).await?;
        let stories = self.catalog.assembler().assemble_full(records).await?;
        Ok(stories.iter().filter_map(RankingData::from_story).collect())
    }

    /// Per-story relevancy summed from the user's feedback history, joined
    /// with the story's features. Stories that no longer resolve are skipped.
    pub async fn training_data(&self, user_id: &str) -> Result<Vec<RankingData>> {
        let mut per_story: BTreeMap<String, (f64, DateTime<Utc>)> = BTreeMap::new();
        for feedback in self.log.list(user_id).await? {
            let entry = per_story
                .entry(feedback.story_id.clone())
                .or_insert((0.0, feedback.feedback_datetime));
            entry.0 += feedback.feedback_type.relevancy_delta();
            if feedback.feedback_datetime > entry.1 {
                entry.1 = feedback.feedback_datetime;
            }
        }

        let mut rows = Vec::with_capacity(per_story.len());
        for (story_id, (relevancy_rate, latest)) in per_story {
            let story = match self.catalog.story_by_id(&story_id).await {
                Ok(story) => story,
                Err(e) => {
                    debug!("Skipping training row for {}: {}", story_id, e);
                    continue;
                }
            };
            if let Some(row) = RankingData::from_story(&story) {
                rows.push(RankingData {
                    user_id: Some(user_id.to_string()),
                    relevancy_rate: Some(relevancy_rate),
                    time_stamp: Some(latest.timestamp()),
                    ..row
                });
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_frequent_picks_maximum() {
        let frequencies = [1, 3, 2];
        assert_eq!(most_frequent(&frequencies, |f| *f), Some(&3));
    }

    #[test]
    fn test_most_frequent_tie_goes_to_earliest() {
        let items = [("a", 2), ("b", 5), ("c", 5)];
        assert_eq!(most_frequent(&items, |item| item.1).map(|item| item.0), Some("b"));
    }

    #[test]
    fn test_most_frequent_of_nothing() {
        let empty: [i64; 0] = [];
        assert_eq!(most_frequent(&empty, |f| *f), None);
    }
}
