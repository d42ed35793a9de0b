use std::future::Future;
use std::str::FromStr;

use anyhow::Result;

pub const STORE_STORIES: &str = "store:stories";
pub const STORE_SCRAPED_URLS: &str = "store:scrapedurls";
pub const STORE_USER_FEEDBACK: &str = "store:userfeedback";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    StoreStories,
    StoreScrapedUrls,
    StoreUserFeedback,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::StoreStories => STORE_STORIES,
            JobKind::StoreScrapedUrls => STORE_SCRAPED_URLS,
            JobKind::StoreUserFeedback => STORE_USER_FEEDBACK,
        }
    }
}

impl FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            STORE_STORIES => Ok(JobKind::StoreStories),
            STORE_SCRAPED_URLS => Ok(JobKind::StoreScrapedUrls),
            STORE_USER_FEEDBACK => Ok(JobKind::StoreUserFeedback),
            other => Err(anyhow::anyhow!("unknown job kind: {other}")),
        }
    }
}

/// A unit of work handed over by the queue layer: a kind plus its JSON payload.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub payload: Vec<u8>,
}

impl Job {
    pub fn new<T: serde::Serialize>(kind: JobKind, payload: &T) -> Result<Self> {
        Ok(Self {
            kind,
            payload: serde_json::to_vec(payload)?,
        })
    }
}

/// Marks a failure the queue layer must not retry (the payload will never decode).
#[derive(Debug)]
pub struct SkipRetry(pub String);

impl std::fmt::Display for SkipRetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "skip retry: {}", self.0)
    }
}

impl std::error::Error for SkipRetry {}

// Handlers are pure functions from decoded payload to a store mutation;
// re-delivering the same job is safe at the document-upsert level.
pub trait JobHandler: Send + Sync {
    fn handle(&self, job: &Job) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_round_trips_through_names() {
        for kind in [JobKind::StoreStories, JobKind::StoreScrapedUrls, JobKind::StoreUserFeedback] {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("store:unknown".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_job_new_encodes_json() {
        let job = Job::new(JobKind::StoreScrapedUrls, &vec!["a", "b"]).unwrap();
        assert_eq!(job.payload, br#"["a","b"]"#.to_vec());
    }
}
