use crate::broadcaster::FeedBroadcaster;
use crate::feedback::FeedbackPropagator;
use crate::stories::StoryCatalog;
use crate::types::{Job, JobHandler, JobKind, NewsError, ScrapedUrl, Story, UserFeedback};
use anyhow::{Context, Result};
use interfaces::jobs::SkipRetry;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

/// Job handlers for the three store kinds.
#[derive(Clone)]
pub struct NewsJobs {
    catalog: StoryCatalog,
    propagator: FeedbackPropagator,
    broadcaster: Option<FeedBroadcaster>,
}

impl NewsJobs {
    pub fn new(catalog: StoryCatalog, propagator: FeedbackPropagator) -> Self {
        Self {
            catalog,
            propagator,
            broadcaster: None,
        }
    }

    /// Push a fresh public feed after every stored story batch.
    pub fn with_broadcaster(mut self, broadcaster: FeedBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    async fn store_stories(&self, stories: Vec<Story>) -> Result<()> {
        info!("Storing {} stories", stories.len());
        let summary = self.catalog.insert_stories(&stories).await?;
        if summary.stories > 0 {
            if let Some(broadcaster) = &self.broadcaster {
                if let Err(e) = broadcaster.refresh().await {
                    warn!("Feed refresh after ingest failed: {}", e);
                }
            }
        }
        Ok(())
    }

    async fn store_scraped_urls(&self, urls: Vec<ScrapedUrl>) -> Result<()> {
        info!("Storing {} scraped urls", urls.len());
        self.catalog.add_scraped_urls(&urls).await?;
        Ok(())
    }

    async fn store_user_feedback(&self, event: UserFeedback) -> Result<()> {
        info!("Storing feedback from {}", event.user_id);
        match self.propagator.feedback_received(&event).await {
            Ok(outcome) => {
                if outcome.failures > 0 {
                    warn!("Feedback on {} partially applied: {:?}", event.story_id, outcome);
                }
                Ok(())
            }
            Err(e) if e.is_validation() => Err(skip_retry(e)),
            Err(e) => Err(e.into()),
        }
    }
}

impl JobHandler for NewsJobs {
    async fn handle(&self, job: &Job) -> Result<()> {
        let result = match job.kind {
            JobKind::StoreStories => self.store_stories(decode(job)?).await,
            JobKind::StoreScrapedUrls => self.store_scraped_urls(decode(job)?).await,
            JobKind::StoreUserFeedback => self.store_user_feedback(decode(job)?).await,
        };
        result.with_context(|| format!("job {} failed", job.kind.as_str()))
    }
}

/// A payload that does not decode now never will.
fn decode<T: DeserializeOwned>(job: &Job) -> Result<T> {
    serde_json::from_slice(&job.payload)
        .map_err(|e| skip_retry(NewsError::Serialization(e)))
}

fn skip_retry(error: NewsError) -> anyhow::Error {
    anyhow::Error::new(SkipRetry(error.to_string()))
}

/// Whether the queue layer should give up on this failure.
pub fn is_skip_retry(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<SkipRetry>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_retry_survives_context() {
        let error = skip_retry(NewsError::Validation("bad".into())).context("job store:stories failed");
        assert!(is_skip_retry(&error));
        assert!(!is_skip_retry(&anyhow::anyhow!("database down")));
    }
}
