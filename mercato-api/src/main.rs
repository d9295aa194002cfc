use anyhow::Context;
use mercato_api::{app, worker, AppState, ServiceOptions};
use mercato_store::{app_config::Config, DbClient, PgOrderStore, YooKassaGateway};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercato_api=debug,mercato_order=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Mercato API on port {}", config.server.port);

    let db = DbClient::connect(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let store = Arc::new(PgOrderStore::new(db.pool.clone()));
    let gateway = Arc::new(YooKassaGateway::new(&config.payment)?);
    let options = ServiceOptions::from_config(&config)?;
    let sweep_interval = options.sweep_interval;
    let state = AppState::new(store, gateway, options)?;

    worker::spawn_event_logger(&state.events);
    tokio::spawn(worker::start_expiry_worker(
        state.sweeper.clone(),
        state.metrics.clone(),
        sweep_interval,
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
