//! Worker process: claims routed jobs and executes them.
//!
//! The worker is stateless: every claimed job is reconstructed from its
//! ledger row, so any number of instances can serve the same pools.
//! Device protocol connectors are registered by the embedding binary via
//! [`run`]'s registry argument; this crate never implements protocols.

use std::sync::Arc;
use std::time::Duration;

use netfleet_core::secrets::CredentialVault;
use netfleet_db::DbPool;
use netfleet_engine::{
    ExecutorConfig, InventoryResolver, JobRunner, OperationRegistry, TaskExecutor, DEFAULT_POOL,
};
use netfleet_events::{LogFanout, PgLogStore};
use tokio_util::sync::CancellationToken;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Region identifiers this worker serves, from comma-separated
    /// `WORKER_REGIONS` (default: empty).
    pub regions: Vec<String>,
    /// Whether this worker also serves the default pool
    /// (`WORKER_SERVE_DEFAULT`, default: `true`).
    pub serve_default_pool: bool,
    /// Per-job concurrency bound (`WORKER_CONCURRENCY`, default: `16`).
    pub concurrency: usize,
    /// Per-host operation deadline in seconds
    /// (`WORKER_HOST_TIMEOUT_SECS`, default: `60`).
    pub host_timeout_secs: u64,
    /// Claim polling interval in milliseconds
    /// (`WORKER_POLL_INTERVAL_MS`, default: `1000`).
    pub poll_interval_ms: u64,
    /// Hex-encoded AES-256 key for credential unsealing
    /// (`CREDENTIAL_KEY`, required).
    pub credential_key: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let regions: Vec<String> = std::env::var("WORKER_REGIONS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let serve_default_pool: bool = std::env::var("WORKER_SERVE_DEFAULT")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("WORKER_SERVE_DEFAULT must be true or false");

        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| "16".into())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");

        let host_timeout_secs: u64 = std::env::var("WORKER_HOST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("WORKER_HOST_TIMEOUT_SECS must be a valid u64");

        let poll_interval_ms: u64 = std::env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("WORKER_POLL_INTERVAL_MS must be a valid u64");

        let credential_key =
            std::env::var("CREDENTIAL_KEY").expect("CREDENTIAL_KEY must be set (64 hex chars)");

        Self {
            regions,
            serve_default_pool,
            concurrency,
            host_timeout_secs,
            poll_interval_ms,
            credential_key,
        }
    }

    /// The pool identifiers this worker claims from.
    pub fn served_pools(&self) -> Vec<String> {
        let mut pools = self.regions.clone();
        if self.serve_default_pool {
            pools.push(DEFAULT_POOL.to_string());
        }
        pools
    }
}

/// Wire up the runner and drive it until the token is cancelled.
pub async fn run(
    pool: DbPool,
    registry: Arc<OperationRegistry>,
    config: WorkerConfig,
    cancel: CancellationToken,
) -> Result<(), netfleet_core::CoreError> {
    let vault = CredentialVault::from_hex(&config.credential_key)?;
    let resolver = InventoryResolver::new(pool.clone(), vault);
    let executor = TaskExecutor::new(ExecutorConfig {
        concurrency: config.concurrency,
        host_timeout: Duration::from_secs(config.host_timeout_secs),
    });
    let fanout = Arc::new(LogFanout::new(Arc::new(PgLogStore::new(pool.clone()))));

    let runner = JobRunner::new(
        pool,
        resolver,
        executor,
        registry,
        fanout,
        config.served_pools(),
    )
    .with_poll_interval(Duration::from_millis(config.poll_interval_ms));

    runner.run(cancel).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn served_pools_include_default_when_enabled() {
        let config = WorkerConfig {
            regions: vec!["emea".to_string(), "apac".to_string()],
            serve_default_pool: true,
            concurrency: 16,
            host_timeout_secs: 60,
            poll_interval_ms: 1000,
            credential_key: String::new(),
        };
        assert_eq!(config.served_pools(), vec!["emea", "apac", DEFAULT_POOL]);
    }

    #[test]
    fn served_pools_can_exclude_default() {
        let config = WorkerConfig {
            regions: vec!["emea".to_string()],
            serve_default_pool: false,
            concurrency: 16,
            host_timeout_secs: 60,
            poll_interval_ms: 1000,
            credential_key: String::new(),
        };
        assert_eq!(config.served_pools(), vec!["emea"]);
    }
}
