//! Routing dispatcher: assigns a worker pool to each due job.
//!
//! Polls the ledger for unrouted jobs whose dispatch time has arrived,
//! resolves their targets (for routing only; execution resolves again),
//! and stamps the selected region. The assignment is guarded, so multiple
//! dispatcher instances can run side by side.

use std::time::Duration;

use netfleet_core::error::CoreError;
use netfleet_db::models::job::Job;
use netfleet_db::repositories::JobRepo;
use netfleet_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::resolver::InventoryResolver;
use crate::router::{RegionChoice, RegionRouter};

/// Default polling interval for the routing loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum jobs routed per cycle.
const ROUTING_BATCH: i64 = 16;

/// Background routing loop.
pub struct RoutingDispatcher {
    pool: DbPool,
    resolver: InventoryResolver,
    router: RegionRouter,
    poll_interval: Duration,
}

impl RoutingDispatcher {
    pub fn new(pool: DbPool, resolver: InventoryResolver) -> Self {
        let router = RegionRouter::new(pool.clone());
        Self {
            pool,
            resolver,
            router,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the routing loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Routing dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Routing dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.route_due_jobs().await {
                        tracing::error!(error = %e, "Routing cycle failed");
                    }
                }
            }
        }
    }

    /// One routing cycle.
    async fn route_due_jobs(&self) -> Result<(), sqlx::Error> {
        let due = JobRepo::due_for_routing(&self.pool, ROUTING_BATCH).await?;

        for job in due {
            let choice = self.choose_region(&job).await;
            let Some(choice) = choice else {
                // Transient directory failure; the job stays unrouted and
                // is retried next cycle.
                continue;
            };

            let assigned = JobRepo::assign_region(&self.pool, job.id, choice.identifier()).await?;
            if assigned {
                tracing::info!(
                    job_id = job.id,
                    region = choice.identifier(),
                    job_type = %job.job_type,
                    "Job routed",
                );
            }
        }

        Ok(())
    }

    /// Routing decision for one job. `None` means "retry later".
    async fn choose_region(&self, job: &Job) -> Option<RegionChoice> {
        let filter = match job.target_filter() {
            Ok(filter) => filter,
            Err(e) => {
                // The stored filter cannot be read; route to the default
                // pool so a worker claims the job and fails it properly;
                // the ledger cannot move queued straight to failed.
                tracing::warn!(job_id = job.id, error = %e, "Unreadable target filter; routing to default pool");
                return Some(RegionChoice::DefaultPool);
            }
        };

        let hosts = match self.resolver.resolve(job.tenant_id, &filter).await {
            Ok(hosts) => hosts,
            Err(CoreError::InvalidRequest(reason)) => {
                tracing::warn!(job_id = job.id, %reason, "Invalid filter; routing to default pool");
                return Some(RegionChoice::DefaultPool);
            }
            Err(e) => {
                tracing::warn!(job_id = job.id, error = %e, "Resolution failed during routing; will retry");
                return None;
            }
        };

        match self.router.select(job.tenant_id, &hosts).await {
            Ok(choice) => Some(choice),
            Err(e) => {
                tracing::warn!(job_id = job.id, error = %e, "Region snapshot failed during routing; will retry");
                None
            }
        }
    }
}
