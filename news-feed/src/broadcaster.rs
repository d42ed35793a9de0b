use crate::hub::HubHandle;
use crate::selector::RecommendationSelector;
use crate::types::Result;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Pushes the public feed to every connected client, on a timer and on demand.
#[derive(Clone)]
pub struct FeedBroadcaster {
    selector: RecommendationSelector,
    hub: HubHandle,
    language: String,
    period: Duration,
}

impl FeedBroadcaster {
    pub fn new(selector: RecommendationSelector, hub: HubHandle, language: impl Into<String>, period: Duration) -> Self {
        Self {
            selector,
            hub,
            language: language.into(),
            period,
        }
    }

    /// Broadcast the current public feed as a JSON array. Returns the number
    /// of stories sent.
    pub async fn refresh(&self) -> Result<usize> {
        let stories = self.selector.public_stories(&self.language).await?;
        let payload = serde_json::to_string(&stories)?;
        self.hub.broadcast(payload).await?;
        info!("Broadcast {} public stories ({})", stories.len(), self.language);
        Ok(stories.len())
    }

    /// Refresh every period, starting immediately. Failures are logged and
    /// the timer keeps going.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    error!("Feed broadcast failed: {}", e);
                }
            }
        })
    }
}
