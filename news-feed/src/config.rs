//! Command line and environment configuration.

use crate::types::{FeedConfig, RecommenderConfig, ResolveMode, DEFAULT_LANGUAGE};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// News feed service: story assembly, recommendations, feedback and live feed push.
#[derive(Parser, Debug, Clone)]
#[command(name = "news-feed")]
pub struct Cli {
    /// PostgreSQL connection string; an in-memory store is used when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Base URL of the recommendation service
    #[arg(long, env = "RECOMMENDER_URL")]
    pub recommender_url: Option<String>,

    /// Recommender per-request timeout in milliseconds
    #[arg(long, env = "RECOMMENDER_TIMEOUT_MS", default_value = "3000")]
    pub recommender_timeout_ms: u64,

    /// Address the HTTP/WebSocket listener binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// What a failed entity lookup does to a batch
    #[arg(long, env = "RESOLVE_MODE", value_enum, default_value_t = ResolveMode::Lenient)]
    pub resolve_mode: ResolveMode,

    /// Language of the broadcast public feed
    #[arg(long, env = "FEED_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    pub feed_language: String,

    /// Seconds between public feed broadcasts
    #[arg(long, env = "BROADCAST_INTERVAL_SECS", default_value = "3600")]
    pub broadcast_interval_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP/WebSocket listener and the feed broadcaster (default)
    Serve,
    /// Run one job from a JSON payload file
    Job {
        /// store:stories, store:scrapedurls or store:userfeedback
        kind: String,
        payload: PathBuf,
    },
    /// Delete stories past the retention window
    Prune,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            resolve_mode: self.resolve_mode,
            feed_language: self.feed_language.clone(),
            broadcast_interval: Duration::from_secs(self.broadcast_interval_secs.max(1)),
            ..FeedConfig::default()
        }
    }

    pub fn recommender_config(&self) -> RecommenderConfig {
        RecommenderConfig {
            base_url: self.recommender_url.clone().filter(|url| !url.is_empty()),
            timeout: Duration::from_millis(self.recommender_timeout_ms),
            ..RecommenderConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["news-feed"]).unwrap();
        assert_eq!(cli.command(), Command::Serve);
        assert_eq!(cli.resolve_mode, ResolveMode::Lenient);

        let config = cli.feed_config();
        assert_eq!(config.page_size, 12);
        assert_eq!(config.broadcast_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_job_subcommand_and_strict_mode() {
        let cli = Cli::try_parse_from([
            "news-feed",
            "--resolve-mode",
            "strict",
            "--recommender-url",
            "http://recommender:8000",
            "job",
            "store:stories",
            "stories.json",
        ])
        .unwrap();

        assert_eq!(cli.feed_config().resolve_mode, ResolveMode::Strict);
        assert_eq!(cli.recommender_config().base_url.as_deref(), Some("http://recommender:8000"));
        assert_eq!(
            cli.command(),
            Command::Job {
                kind: "store:stories".to_string(),
                payload: PathBuf::from("stories.json"),
            }
        );
    }
}
