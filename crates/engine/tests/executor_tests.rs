//! Integration tests for the task executor: folding, isolation, timeouts,
//! the concurrency bound, and cooperative cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netfleet_core::host::{ConnectionCredentials, HostDescriptor};
use netfleet_core::outcome::REASON_NO_TARGETS;
use netfleet_core::payload::OperationPayload;
use netfleet_db::models::status::JobStatus;
use netfleet_engine::{
    conclude, DeviceOperation, ExecutorConfig, OperationError, OperationOutput, TaskExecutor,
};
use netfleet_events::{LogFanout, MemoryLogStore};
use tokio_util::sync::CancellationToken;

const JOB: i64 = 7;

fn host(device_id: i64, hostname: &str) -> HostDescriptor {
    HostDescriptor {
        device_id,
        hostname: hostname.to_string(),
        address: format!("192.0.2.{device_id}"),
        platform: "eos".to_string(),
        role: None,
        site: None,
        vendor: None,
        tags: Vec::new(),
        region_id: None,
        credentials: ConnectionCredentials {
            username: "svc".to_string(),
            secret: "secret".to_string(),
        },
    }
}

fn hosts(names: &[&str]) -> Vec<HostDescriptor> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| host(i as i64 + 1, name))
        .collect()
}

fn payload() -> OperationPayload {
    OperationPayload::RunCommands {
        commands: vec!["show version".to_string()],
    }
}

fn fanout() -> (Arc<MemoryLogStore>, Arc<LogFanout>) {
    let store = Arc::new(MemoryLogStore::new());
    let fanout = Arc::new(LogFanout::new(
        Arc::clone(&store) as Arc<dyn netfleet_events::LogStore>
    ));
    (store, fanout)
}

fn executor(concurrency: usize, host_timeout: Duration) -> TaskExecutor {
    TaskExecutor::new(ExecutorConfig {
        concurrency,
        host_timeout,
    })
}

// ---------------------------------------------------------------------------
// Stub operations
// ---------------------------------------------------------------------------

/// Succeeds for every host after a fixed delay.
struct Succeed {
    delay: Duration,
}

#[async_trait]
impl DeviceOperation for Succeed {
    async fn run(
        &self,
        host: &HostDescriptor,
        _payload: &OperationPayload,
    ) -> Result<OperationOutput, OperationError> {
        tokio::time::sleep(self.delay).await;
        Ok(OperationOutput::with_data(
            serde_json::json!({ "host": host.hostname }),
        ))
    }
}

/// Fails hosts whose name contains the needle, succeeds otherwise.
struct FailMatching {
    needle: &'static str,
}

#[async_trait]
impl DeviceOperation for FailMatching {
    async fn run(
        &self,
        host: &HostDescriptor,
        _payload: &OperationPayload,
    ) -> Result<OperationOutput, OperationError> {
        if host.hostname.contains(self.needle) {
            Err(OperationError::connect("connection refused"))
        } else {
            Ok(OperationOutput::empty())
        }
    }
}

/// Never returns for hosts whose name contains the needle.
struct HangMatching {
    needle: &'static str,
}

#[async_trait]
impl DeviceOperation for HangMatching {
    async fn run(
        &self,
        host: &HostDescriptor,
        _payload: &OperationPayload,
    ) -> Result<OperationOutput, OperationError> {
        if host.hostname.contains(self.needle) {
            std::future::pending::<()>().await;
        }
        Ok(OperationOutput::empty())
    }
}

/// Panics for hosts whose name contains the needle.
struct PanicMatching {
    needle: &'static str,
}

#[async_trait]
impl DeviceOperation for PanicMatching {
    async fn run(
        &self,
        host: &HostDescriptor,
        _payload: &OperationPayload,
    ) -> Result<OperationOutput, OperationError> {
        assert!(
            !host.hostname.contains(self.needle),
            "injected panic for {}",
            host.hostname
        );
        Ok(OperationOutput::empty())
    }
}

/// Tracks the maximum number of concurrently running operations.
struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DeviceOperation for ConcurrencyProbe {
    async fn run(
        &self,
        _host: &HostDescriptor,
        _payload: &OperationPayload,
    ) -> Result<OperationOutput, OperationError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(OperationOutput::empty())
    }
}

/// Succeeds slowly and trips the cancellation token once `threshold`
/// hosts have completed.
struct CancelAfter {
    completed: AtomicUsize,
    threshold: usize,
    token: CancellationToken,
}

#[async_trait]
impl DeviceOperation for CancelAfter {
    async fn run(
        &self,
        _host: &HostDescriptor,
        _payload: &OperationPayload,
    ) -> Result<OperationOutput, OperationError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if done == self.threshold {
            self.token.cancel();
        }
        Ok(OperationOutput::empty())
    }
}

// ---------------------------------------------------------------------------
// Folding scenarios
// ---------------------------------------------------------------------------

/// Three hosts, all succeed: terminal `success` with counts 3/0, one log
/// entry per host.
#[tokio::test]
async fn all_hosts_succeed() {
    let (store, fanout) = fanout();
    let executor = executor(4, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let report = executor
        .execute(
            JOB,
            hosts(&["sw-a", "sw-b", "sw-c"]),
            &payload(),
            Arc::new(Succeed {
                delay: Duration::from_millis(5),
            }),
            Arc::clone(&fanout),
            &cancel,
        )
        .await;

    assert!(!report.cancelled);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(store.len(JOB), 3);

    let (status, summary) = conclude(report);
    assert_eq!(status, JobStatus::Succeeded);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
}

/// One failing host yields `partial` and exact counts; its siblings are
/// untouched.
#[tokio::test]
async fn single_failure_is_isolated() {
    let (_store, fanout) = fanout();
    let executor = executor(4, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let report = executor
        .execute(
            JOB,
            hosts(&["sw-a", "sw-bad", "sw-c"]),
            &payload(),
            Arc::new(FailMatching { needle: "bad" }),
            fanout,
            &cancel,
        )
        .await;

    let (status, summary) = conclude(report);
    assert_eq!(status, JobStatus::Partial);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let failed = summary.hosts.iter().find(|o| !o.succeeded).expect("failed host");
    assert_eq!(failed.host, "sw-bad");
    assert_eq!(failed.error_code.as_deref(), Some("connect"));
}

/// Every host failing yields `failed`.
#[tokio::test]
async fn all_hosts_failing_yields_failed() {
    let (_store, fanout) = fanout();
    let executor = executor(4, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let report = executor
        .execute(
            JOB,
            hosts(&["bad-1", "bad-2"]),
            &payload(),
            Arc::new(FailMatching { needle: "bad" }),
            fanout,
            &cancel,
        )
        .await;

    let (status, summary) = conclude(report);
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 2);
}

/// Zero resolved hosts is a failure carrying the no-targets marker,
/// never a success.
#[tokio::test]
async fn empty_host_list_fails_with_marker() {
    let (store, fanout) = fanout();
    let executor = executor(4, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let report = executor
        .execute(
            JOB,
            Vec::new(),
            &payload(),
            Arc::new(Succeed {
                delay: Duration::ZERO,
            }),
            fanout,
            &cancel,
        )
        .await;

    assert!(report.outcomes.is_empty());
    assert!(store.is_empty(JOB));

    let (status, summary) = conclude(report);
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(summary.reason.as_deref(), Some(REASON_NO_TARGETS));
}

// ---------------------------------------------------------------------------
// Timeouts and panics
// ---------------------------------------------------------------------------

/// A hanging host is recorded as a timeout failure while its siblings
/// complete normally.
#[tokio::test]
async fn timeout_is_isolated_to_one_host() {
    let (store, fanout) = fanout();
    let executor = executor(4, Duration::from_millis(50));
    let cancel = CancellationToken::new();

    let report = executor
        .execute(
            JOB,
            hosts(&["sw-a", "sw-hang", "sw-c"]),
            &payload(),
            Arc::new(HangMatching { needle: "hang" }),
            Arc::clone(&fanout),
            &cancel,
        )
        .await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(store.len(JOB), 3);

    let (status, summary) = conclude(report);
    assert_eq!(status, JobStatus::Partial);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let timed_out = summary.hosts.iter().find(|o| !o.succeeded).expect("timed-out host");
    assert_eq!(timed_out.host, "sw-hang");
    assert_eq!(timed_out.error_code.as_deref(), Some("timeout"));
}

/// A panicking operation becomes a failed outcome for its host instead of
/// aborting the run.
#[tokio::test]
async fn panic_is_recorded_as_host_failure() {
    let (_store, fanout) = fanout();
    let executor = executor(4, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let report = executor
        .execute(
            JOB,
            hosts(&["sw-a", "sw-boom", "sw-c"]),
            &payload(),
            Arc::new(PanicMatching { needle: "boom" }),
            fanout,
            &cancel,
        )
        .await;

    let (status, summary) = conclude(report);
    assert_eq!(status, JobStatus::Partial);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let crashed = summary.hosts.iter().find(|o| !o.succeeded).expect("crashed host");
    assert_eq!(crashed.host, "sw-boom");
    assert_eq!(crashed.error_code.as_deref(), Some("panic"));
}

// ---------------------------------------------------------------------------
// Concurrency bound
// ---------------------------------------------------------------------------

/// In-flight operations never exceed the configured bound, regardless of
/// host count.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_bound_is_respected() {
    let (_store, fanout) = fanout();
    let executor = executor(5, Duration::from_secs(5));
    let cancel = CancellationToken::new();
    let probe = Arc::new(ConcurrencyProbe::new());

    let names: Vec<String> = (1..=20).map(|i| format!("sw-{i:02}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let report = executor
        .execute(
            JOB,
            hosts(&name_refs),
            &payload(),
            Arc::clone(&probe) as Arc<dyn DeviceOperation>,
            fanout,
            &cancel,
        )
        .await;

    assert_eq!(report.outcomes.len(), 20);
    assert!(report.outcomes.iter().all(|o| o.succeeded));
    assert!(
        probe.peak.load(Ordering::SeqCst) <= 5,
        "peak concurrency {} exceeded the bound",
        probe.peak.load(Ordering::SeqCst)
    );
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cancelling mid-flight stops new dispatches, lets in-flight hosts
/// finish, and concludes as `cancelled` with the collected outcomes.
#[tokio::test]
async fn cancellation_stops_new_dispatches() {
    let (_store, fanout) = fanout();
    let executor = executor(2, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let operation = Arc::new(CancelAfter {
        completed: AtomicUsize::new(0),
        threshold: 2,
        token: cancel.clone(),
    });

    let names: Vec<String> = (1..=10).map(|i| format!("sw-{i:02}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let report = executor
        .execute(
            JOB,
            hosts(&name_refs),
            &payload(),
            operation,
            fanout,
            &cancel,
        )
        .await;

    assert!(report.cancelled);
    // The two completed hosts, plus at most the two that were already
    // in flight when the token tripped.
    assert!(
        report.outcomes.len() >= 2 && report.outcomes.len() <= 4,
        "expected 2..=4 outcomes, got {}",
        report.outcomes.len()
    );

    let (status, summary) = conclude(report);
    assert_eq!(status, JobStatus::Cancelled);
    assert!(summary.reason.as_deref().unwrap_or("").contains("cancelled"));
    assert_eq!(summary.total, summary.hosts.len());
}
