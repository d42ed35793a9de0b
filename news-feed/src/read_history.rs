use crate::store::{collections, Collection, Filter, SharedStore};
use crate::types::{ReadStory, Result};
use chrono::{Duration, Utc};
use interfaces::timestamp;
use tracing::debug;
use uuid::Uuid;

/// Append-only log of read receipts, queried over a rolling window.
#[derive(Clone)]
pub struct ReadHistory {
    reads: Collection<ReadStory>,
    window_days: i64,
}

impl ReadHistory {
    pub fn new(store: SharedStore, window_days: i64) -> Self {
        Self {
            reads: Collection::new(store, collections::READ_STORY),
            window_days,
        }
    }

    pub async fn add(&self, receipt: &ReadStory) -> Result<()> {
        self.reads.save(receipt).await?;
        Ok(())
    }

    /// Distinct stories the user read within the window.
    pub async fn recent_story_ids(&self, user_id: &str) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let filter = Filter::eq("user_id", user_id)
            .and(Filter::gte("read_time", timestamp::to_value(&(now - Duration::days(self.window_days)))))
            .and(Filter::lt("read_time", timestamp::to_value(&now)));

        let ids = self.reads.distinct(&filter, "story_id").await?;
        Ok(ids
            .iter()
            .filter_map(|raw| match Uuid::parse_str(raw) {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!("Ignoring read receipt with story id {:?}: {}", raw, e);
                    None
                }
            })
            .collect())
    }
}
