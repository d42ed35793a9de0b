use crate::types::{NewsError, RecommenderConfig, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Ordered story ids recommended to a user.
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn recommendations(&self, user_id: &str, language: &str) -> Result<Vec<Uuid>>;
}

/// HTTP client for the external recommender:
/// `GET {base}/recommendations/{user}/{language}` returning a JSON array of
/// story ids. A 404 means no recommendation is available.
pub struct RecommenderClient {
    client: Client,
    config: RecommenderConfig,
}

impl RecommenderClient {
    pub fn new(config: RecommenderConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, user_id: &str, language: &str) -> Result<Url> {
        let base = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| NewsError::UpstreamUnavailable("no recommender configured".to_string()))?;

        let mut url = Url::parse(base)?;
        url.path_segments_mut()
            .map_err(|_| NewsError::Validation(format!("recommender URL cannot be a base: {base}")))?
            .pop_if_empty()
            .extend(["recommendations", user_id, language]);
        Ok(url)
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<Uuid>> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(NewsError::UpstreamUnavailable("no recommendation available".to_string()));
        }
        if !status.is_success() {
            return Err(NewsError::UpstreamUnavailable(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        Ok(response.json::<Vec<Uuid>>().await?)
    }
}

#[async_trait]
impl RecommendationSource for RecommenderClient {
    async fn recommendations(&self, user_id: &str, language: &str) -> Result<Vec<Uuid>> {
        let url = self.endpoint(user_id, language)?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: self.config.retry_delay,
            initial_interval: self.config.retry_delay,
            max_interval: self.config.retry_delay * 8,
            multiplier: 2.0,
            max_elapsed_time: Some(self.config.timeout * (self.config.max_retries + 1)),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.fetch_once(&url).await {
                Ok(ids) => {
                    debug!("Recommender returned {} stories for {}", ids.len(), user_id);
                    return Ok(ids);
                }
                Err(e) if attempt < self.config.max_retries && is_transient(&e) => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(e);
                    };
                    warn!("Recommender attempt {} failed, retrying in {:?}: {}", attempt + 1, delay, e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// "Not found" is an answer, not an outage; only transport errors and
// server-side statuses are worth another attempt.
fn is_transient(error: &NewsError) -> bool {
    match error {
        NewsError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        NewsError::UpstreamUnavailable(message) => message.starts_with("HTTP 5"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_segments() -> Result<()> {
        let client = RecommenderClient::new(RecommenderConfig {
            base_url: Some("http://ml.local:8000/".to_string()),
            ..RecommenderConfig::default()
        })?;

        let url = client.endpoint("user 1", "fr")?;
        assert_eq!(url.as_str(), "http://ml.local:8000/recommendations/user%201/fr");
        Ok(())
    }

    #[tokio::test]
    async fn test_unconfigured_client_is_unavailable() -> Result<()> {
        let client = RecommenderClient::new(RecommenderConfig::default())?;
        let error = client.recommendations("user", "en").await.unwrap_err();
        assert!(matches!(error, NewsError::UpstreamUnavailable(_)));
        Ok(())
    }
}
