use anyhow::Context;
use clap::Parser;
use news_feed::config::{Cli, Command};
use news_feed::store::{MemoryStore, PgDocumentStore, SharedStore};
use news_feed::{HubHandle, Job, JobHandler, JobKind, NewsService, RecommenderClient};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let store = open_store(cli.database_url.as_deref()).await?;
    let config = cli.feed_config();
    let recommender = Arc::new(RecommenderClient::new(cli.recommender_config())?);
    let (hub, _hub_task) = HubHandle::spawn(config.client_queue_capacity);
    let service = NewsService::new(store, &config, recommender, hub);

    match cli.command() {
        Command::Serve => {
            let _broadcast_task = service.broadcaster.clone().spawn();
            news_feed::server::serve(service, cli.bind_addr).await?;
        }
        Command::Job { kind, payload } => {
            let kind: JobKind = kind.parse()?;
            let payload = tokio::fs::read(&payload)
                .await
                .with_context(|| format!("reading {}", payload.display()))?;
            service.jobs.handle(&Job { kind, payload }).await?;
            info!("Job {} done", kind.as_str());
        }
        Command::Prune => {
            let removed = service.catalog.remove_old_stories().await?;
            info!("Pruned {} stories", removed);
        }
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_store(database_url: Option<&str>) -> anyhow::Result<SharedStore> {
    match database_url {
        Some(url) if !url.is_empty() => {
            let store = PgDocumentStore::new(url)
                .await
                .context("connecting to PostgreSQL")?;
            store.migrate().await?;
            info!("Using PostgreSQL document store");
            Ok(Arc::new(store))
        }
        _ => {
            warn!("DATABASE_URL not set; using the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
