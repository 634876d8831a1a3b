use std::sync::Arc;

use netfleet_engine::OperationRegistry;
use netfleet_worker::WorkerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netfleet_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    let instance_id = uuid::Uuid::now_v7();
    tracing::info!(
        %instance_id,
        pools = ?config.served_pools(),
        concurrency = config.concurrency,
        "Worker starting",
    );

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = netfleet_db::create_pool(&database_url).await?;
    netfleet_db::health_check(&pool).await?;

    // Device protocol connectors are deployment-specific and register
    // here; a job type with no registered operation finalizes as failed
    // with that reason recorded.
    let registry = Arc::new(OperationRegistry::new());
    if registry.registered_types().is_empty() {
        tracing::warn!("No device operations registered; claimed jobs will fail until connectors are wired in");
    }

    let cancel = tokio_util::sync::CancellationToken::new();
    let shutdown = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        })
    };

    netfleet_worker::run(pool, registry, config, cancel).await?;

    shutdown.abort();
    tracing::info!("Worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
