//! Bounded-concurrency per-host task execution.
//!
//! Runs the job's operation once per resolved host under a concurrency
//! bound with a per-host timeout. One host's failure (error, timeout, or
//! panic) never aborts its siblings. Every outcome is appended to the job
//! log before the aggregate is computed, so partial progress stays visible
//! even if the job is later cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use netfleet_core::host::HostDescriptor;
use netfleet_core::outcome::{fold_outcomes, AggregateStatus, HostOutcome, ResultSummary};
use netfleet_core::payload::OperationPayload;
use netfleet_core::types::DbId;
use netfleet_db::models::job_log::NewLogEntry;
use netfleet_db::models::status::{JobStatus, LogLevel};
use netfleet_events::LogFanout;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::operation::DeviceOperation;

/// Default number of in-flight per-host operations per job.
const DEFAULT_CONCURRENCY: usize = 16;

/// Default per-host operation deadline.
const DEFAULT_HOST_TIMEOUT: Duration = Duration::from_secs(60);

/// Tuning knobs for one executor instance.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Concurrency bound, independent of how many hosts a job resolves.
    pub concurrency: usize,
    /// Deadline for a single host's operation. There is no whole-job
    /// deadline; a slow fleet is bounded by this times the remaining
    /// dispatch slots.
    pub host_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            host_timeout: DEFAULT_HOST_TIMEOUT,
        }
    }
}

/// What one execution collected: outcomes for every host that was
/// dispatched, plus whether cancellation cut the dispatch loop short.
#[derive(Debug)]
pub struct ExecutionReport {
    pub outcomes: Vec<HostOutcome>,
    pub cancelled: bool,
}

/// Runs a job's operation across its resolved hosts.
pub struct TaskExecutor {
    config: ExecutorConfig,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Execute `operation` once per host.
    ///
    /// Cancellation is cooperative: the token is checked before each
    /// dispatch, in-flight hosts are allowed to finish, and no new host is
    /// started once cancellation is observed.
    pub async fn execute(
        &self,
        job_id: DbId,
        hosts: Vec<HostDescriptor>,
        payload: &OperationPayload,
        operation: Arc<dyn DeviceOperation>,
        fanout: Arc<LogFanout>,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let payload = Arc::new(payload.clone());
        let mut join_set: JoinSet<HostOutcome> = JoinSet::new();
        // Task id -> host identity, for attributing panicked tasks.
        let mut in_flight: HashMap<tokio::task::Id, (DbId, String)> = HashMap::new();
        let mut outcomes = Vec::with_capacity(hosts.len());
        let mut cancelled = false;

        for host in hosts {
            // Drain whatever already finished so outcomes surface promptly.
            while let Some(finished) = join_set.try_join_next_with_id() {
                record(&mut outcomes, &mut in_flight, finished, &fanout, job_id).await;
            }

            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // Wait for a slot, but keep observing cancellation: a host we
            // never acquired a permit for must not be dispatched either.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.expect("semaphore is never closed")
                }
            };

            let device_id = host.device_id;
            let hostname = host.hostname.clone();
            let operation = Arc::clone(&operation);
            let payload = Arc::clone(&payload);
            let fanout = Arc::clone(&fanout);
            let host_timeout = self.config.host_timeout;

            let handle = join_set.spawn(async move {
                let outcome = run_host(host, &payload, operation.as_ref(), host_timeout).await;
                append_host_entry(&fanout, job_id, &outcome).await;
                drop(permit);
                outcome
            });
            in_flight.insert(handle.id(), (device_id, hostname));
        }

        // In-flight hosts run to completion even under cancellation; they
        // are not forcibly killed.
        while let Some(finished) = join_set.join_next_with_id().await {
            record(&mut outcomes, &mut in_flight, finished, &fanout, job_id).await;
        }

        ExecutionReport { outcomes, cancelled }
    }
}

/// Run one host's operation under the per-host deadline.
async fn run_host(
    host: HostDescriptor,
    payload: &OperationPayload,
    operation: &dyn DeviceOperation,
    host_timeout: Duration,
) -> HostOutcome {
    let started = Instant::now();
    match tokio::time::timeout(host_timeout, operation.run(&host, payload)).await {
        Ok(Ok(output)) => HostOutcome::success(
            host.device_id,
            host.hostname,
            started.elapsed().as_millis() as u64,
            output.data,
        ),
        Ok(Err(err)) => HostOutcome::failure(
            host.device_id,
            host.hostname,
            started.elapsed().as_millis() as u64,
            err.kind.code(),
            err.message,
        ),
        Err(_) => HostOutcome::failure(
            host.device_id,
            host.hostname,
            started.elapsed().as_millis() as u64,
            crate::operation::OperationErrorKind::Timeout.code(),
            format!("Operation exceeded the {}s deadline", host_timeout.as_secs()),
        ),
    }
}

/// Append the per-host log entry for an outcome.
async fn append_host_entry(fanout: &LogFanout, job_id: DbId, outcome: &HostOutcome) {
    let (level, message) = if outcome.succeeded {
        (LogLevel::Info, "Operation succeeded".to_string())
    } else {
        (
            LogLevel::Error,
            format!(
                "Operation failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        )
    };

    let entry = NewLogEntry::for_host(job_id, level, outcome.host.clone(), message).with_extra(
        serde_json::json!({
            "device_id": outcome.device_id,
            "succeeded": outcome.succeeded,
            "duration_ms": outcome.duration_ms,
            "error_code": outcome.error_code,
        }),
    );

    if let Err(e) = fanout.publish(entry).await {
        tracing::warn!(job_id, host = %outcome.host, error = %e, "Failed to append host log entry");
    }
}

/// Fold one finished task into the outcome list. A panicked task becomes a
/// failed outcome for its host instead of taking the job down.
async fn record(
    outcomes: &mut Vec<HostOutcome>,
    in_flight: &mut HashMap<tokio::task::Id, (DbId, String)>,
    finished: Result<(tokio::task::Id, HostOutcome), tokio::task::JoinError>,
    fanout: &LogFanout,
    job_id: DbId,
) {
    match finished {
        Ok((task_id, outcome)) => {
            in_flight.remove(&task_id);
            outcomes.push(outcome);
        }
        Err(join_err) => {
            let (device_id, hostname) = in_flight
                .remove(&join_err.id())
                .unwrap_or((0, "unknown".to_string()));
            tracing::error!(job_id, host = %hostname, error = %join_err, "Host task panicked");
            let outcome = HostOutcome::failure(
                device_id,
                hostname,
                0,
                "panic",
                format!("Host task panicked: {join_err}"),
            );
            append_host_entry(fanout, job_id, &outcome).await;
            outcomes.push(outcome);
        }
    }
}

/// Reduce an execution report to the job's terminal status and summary.
///
/// Cancellation wins over the fold; an empty report (zero resolved hosts)
/// is a failure carrying the no-targets marker, never a success.
pub fn conclude(report: ExecutionReport) -> (JobStatus, ResultSummary) {
    if report.cancelled {
        let summary = ResultSummary::from_outcomes(report.outcomes)
            .with_reason("cancelled before all hosts were dispatched");
        return (JobStatus::Cancelled, summary);
    }
    if report.outcomes.is_empty() {
        return (JobStatus::Failed, ResultSummary::no_targets());
    }
    let status = match fold_outcomes(&report.outcomes) {
        AggregateStatus::Success => JobStatus::Succeeded,
        AggregateStatus::Partial => JobStatus::Partial,
        AggregateStatus::Failed => JobStatus::Failed,
    };
    (status, ResultSummary::from_outcomes(report.outcomes))
}
