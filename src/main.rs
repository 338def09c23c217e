use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::migrate::Migrator;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use paygrid_core::adapters::postgres::{
    PostgresSequenceGenerator, PostgresTenantDirectory, PostgresTransactionStore,
};
use paygrid_core::clock::SystemClock;
use paygrid_core::services::{
    run_dispatcher, run_sweeper, TransactionLifecycle, WebhookDispatcher,
};
use paygrid_core::{config, create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database pool and migrations
    let pool = db::create_pool(&config).await?;
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    // Store adapters
    let store = Arc::new(PostgresTransactionStore::new(pool.clone()));
    let sequences = Arc::new(PostgresSequenceGenerator::new(pool.clone()));
    let tenants = Arc::new(PostgresTenantDirectory::new(pool.clone()));
    let clock = Arc::new(SystemClock);

    // Lifecycle engine and event stream
    let (events, _) = broadcast::channel(256);
    let lifecycle = Arc::new(TransactionLifecycle::new(
        store,
        sequences,
        tenants.clone(),
        clock.clone(),
        events.clone(),
    ));

    // Background workers: webhook fan-out and the expiry sweep
    let dispatcher = Arc::new(WebhookDispatcher::new(
        tenants.clone(),
        clock.clone(),
        Duration::from_secs(config.webhook_timeout_secs),
    ));
    tokio::spawn(run_dispatcher(events.subscribe(), dispatcher));
    tokio::spawn(run_sweeper(
        lifecycle.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    ));

    let state = AppState {
        lifecycle,
        tenants,
        clock,
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
