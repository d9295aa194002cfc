//! One-off expiry sweep, for cron or manual runs.

use anyhow::Context;
use chrono::Utc;
use mercato_order::{EventPublisher, ExpirySweeper, OrderManager, OrderStore};
use mercato_api::ServiceOptions;
use mercato_store::{app_config::Config, DbClient, PgOrderStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercato_order=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let options = ServiceOptions::from_config(&config)?;
    let db = DbClient::connect(&config.database)
        .await
        .context("Failed to connect to Postgres")?;

    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(db.pool.clone()));
    let manager = Arc::new(OrderManager::new(store.clone(), EventPublisher::default()));
    let sweeper = ExpirySweeper::new(store, manager).with_ttl(options.unpaid_ttl);

    let report = sweeper.sweep(Utc::now()).await?;
    println!("Deleted {} unpaid orders.", report.deleted);
    if report.failed > 0 {
        anyhow::bail!("{} unpaid orders could not be deleted", report.failed);
    }
    Ok(())
}
