//! Worker-side job execution loop.
//!
//! The runner is stateless between jobs: each claimed job is reconstructed
//! entirely from its ledger row (tenant, filter, payload), so any worker
//! instance can pick up any job routed to the pools it serves.

use std::sync::Arc;
use std::time::Duration;

use netfleet_core::error::CoreError;
use netfleet_core::outcome::ResultSummary;
use netfleet_db::models::job::Job;
use netfleet_db::models::job_log::NewLogEntry;
use netfleet_db::models::status::{JobStatus, LogLevel};
use netfleet_db::repositories::JobRepo;
use netfleet_db::DbPool;
use netfleet_events::LogFanout;
use tokio_util::sync::CancellationToken;

use crate::executor::{conclude, TaskExecutor};
use crate::operation::OperationRegistry;
use crate::resolver::InventoryResolver;

/// Default claim polling interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often the cancel watcher checks the cooperative flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Claims routed jobs for a set of worker pools and drives them through
/// resolution, execution, and finalization.
pub struct JobRunner {
    pool: DbPool,
    resolver: InventoryResolver,
    executor: TaskExecutor,
    registry: Arc<OperationRegistry>,
    fanout: Arc<LogFanout>,
    /// Pool identifiers this worker serves (region identifiers, and the
    /// default pool when configured).
    served_pools: Vec<String>,
    poll_interval: Duration,
}

impl JobRunner {
    pub fn new(
        pool: DbPool,
        resolver: InventoryResolver,
        executor: TaskExecutor,
        registry: Arc<OperationRegistry>,
        fanout: Arc<LogFanout>,
        served_pools: Vec<String>,
    ) -> Self {
        Self {
            pool,
            resolver,
            executor,
            registry,
            fanout,
            served_pools,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the claim loop until the cancellation token is triggered.
    /// A job in progress when shutdown starts is finished first.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            pools = ?self.served_pools,
            "Job runner started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job runner shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_claims(&cancel).await {
                        tracing::error!(error = %e, "Claim cycle failed");
                    }
                }
            }
        }
    }

    /// Claim and run jobs until the queue is empty or shutdown begins.
    async fn drain_claims(&self, cancel: &CancellationToken) -> Result<(), sqlx::Error> {
        while let Some(job) = JobRepo::claim_next(&self.pool, &self.served_pools).await? {
            self.run_job(job).await;
            if cancel.is_cancelled() {
                break;
            }
        }
        Ok(())
    }

    /// Execute one claimed job and finalize it on the ledger.
    pub async fn run_job(&self, job: Job) {
        let job_id = job.id;
        tracing::info!(
            job_id,
            job_type = %job.job_type,
            tenant_id = job.tenant_id,
            region = job.assigned_region.as_deref().unwrap_or("default"),
            "Job claimed",
        );

        let (status, summary) = match self.execute_job(&job).await {
            Ok(done) => done,
            Err(e) => {
                // Job-level failure before (or instead of) per-host work:
                // resolution errors, unreadable rows, missing operations.
                self.log_job_failure(job_id, &e).await;
                (JobStatus::Failed, ResultSummary::aborted(e.to_string()))
            }
        };

        match JobRepo::transition(&self.pool, job_id, status, Some(&summary)).await {
            Ok(_) => {
                tracing::info!(
                    job_id,
                    status = %status,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    "Job finalized",
                );
            }
            Err(CoreError::InvalidTransition { from, .. }) => {
                // Another finalizer won the race; our collected outcomes
                // are already in the log, the job record is theirs.
                tracing::warn!(job_id, current = from, "Lost finalization race");
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to finalize job");
            }
        }

        self.fanout.retire(job_id).await;
    }

    /// Resolution and execution for one job. Errors out of here finalize
    /// the job as failed with the error as its recorded reason.
    async fn execute_job(&self, job: &Job) -> Result<(JobStatus, ResultSummary), CoreError> {
        let job_type = job.job_type()?;
        let payload = job.payload()?;
        let operation = self.registry.get(job_type).ok_or_else(|| {
            CoreError::Internal(format!("No operation registered for job type {job_type}"))
        })?;
        let filter = job.target_filter()?;

        let hosts = self.resolver.resolve(job.tenant_id, &filter).await?;
        if hosts.is_empty() {
            self.publish(NewLogEntry::job_level(
                job.id,
                LogLevel::Warn,
                "No targets matched the filter",
            ))
            .await;
            return Ok((JobStatus::Failed, ResultSummary::no_targets()));
        }

        self.publish(
            NewLogEntry::job_level(
                job.id,
                LogLevel::Info,
                format!("Resolved {} target hosts", hosts.len()),
            )
            .with_extra(serde_json::json!({ "hosts": hosts.len() })),
        )
        .await;

        // Cooperative cancellation: a watcher trips the token as soon as
        // the ledger flag appears; the executor checks it between per-host
        // dispatches.
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_cancel_flag(
            self.pool.clone(),
            job.id,
            cancel.clone(),
        ));

        let report = self
            .executor
            .execute(
                job.id,
                hosts,
                &payload,
                operation,
                Arc::clone(&self.fanout),
                &cancel,
            )
            .await;

        watcher.abort();
        Ok(conclude(report))
    }

    async fn log_job_failure(&self, job_id: i64, error: &CoreError) {
        self.publish(NewLogEntry::job_level(
            job_id,
            LogLevel::Error,
            error.to_string(),
        ))
        .await;
    }

    async fn publish(&self, entry: NewLogEntry) {
        if let Err(e) = self.fanout.publish(entry).await {
            tracing::warn!(error = %e, "Failed to publish job log entry");
        }
    }
}

/// Poll the ledger's cancellation flag and trip the token once it is set.
async fn watch_cancel_flag(pool: DbPool, job_id: i64, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(CANCEL_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        match JobRepo::cancel_requested(&pool, job_id).await {
            Ok(true) => {
                tracing::info!(job_id, "Cancellation flag observed");
                cancel.cancel();
                break;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Cancel flag check failed");
            }
        }
    }
}
