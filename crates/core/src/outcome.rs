//! Per-host outcomes and the aggregate folding rule.
//!
//! The executor records one [`HostOutcome`] per resolved host and the fold
//! reduces them to the job-level status: all succeed -> success, a mix ->
//! partial, all fail -> failed, and an empty host list is always a failure
//! with a distinguishing marker.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Marker stored in `ResultSummary::reason` when the target filter resolved
/// to zero hosts.
pub const REASON_NO_TARGETS: &str = "no targets matched";

/// Stable error code recorded when a per-host operation exceeds its timeout.
pub const ERROR_CODE_TIMEOUT: &str = "timeout";

// ---------------------------------------------------------------------------
// HostOutcome
// ---------------------------------------------------------------------------

/// Result of running the job's operation against one host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostOutcome {
    pub device_id: DbId,
    pub host: String,
    pub succeeded: bool,
    /// Stable machine-readable code on failure (e.g. `"timeout"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Opaque per-type result data produced by the device operation
    /// (command output, backup contents, discovered neighbors, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl HostOutcome {
    pub fn success(
        device_id: DbId,
        host: impl Into<String>,
        duration_ms: u64,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            device_id,
            host: host.into(),
            succeeded: true,
            error_code: None,
            error: None,
            duration_ms,
            data,
        }
    }

    pub fn failure(
        device_id: DbId,
        host: impl Into<String>,
        duration_ms: u64,
        error_code: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            device_id,
            host: host.into(),
            succeeded: false,
            error_code: Some(error_code.into()),
            error: Some(error.into()),
            duration_ms,
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Job-level outcome computed from per-host outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    Success,
    Partial,
    Failed,
}

/// Durable aggregate result stored on the job row.
///
/// This struct is the compatibility surface downstream consumers (UI,
/// notifications, audit) read; renaming or removing a field breaks them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Set when the job did not run to a per-host conclusion: the
    /// no-targets marker, a resolution failure, or a cancellation note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Per-host detail, in resolution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<HostOutcome>,
}

/// Fold per-host outcomes into the aggregate status.
///
/// An empty slice maps to `Failed`; callers attach [`REASON_NO_TARGETS`] via
/// [`ResultSummary::no_targets`] so the empty case is distinguishable.
pub fn fold_outcomes(outcomes: &[HostOutcome]) -> AggregateStatus {
    if outcomes.is_empty() {
        return AggregateStatus::Failed;
    }
    let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
    if succeeded == outcomes.len() {
        AggregateStatus::Success
    } else if succeeded > 0 {
        AggregateStatus::Partial
    } else {
        AggregateStatus::Failed
    }
}

impl ResultSummary {
    /// Summary for a completed (or cancelled) run with per-host outcomes.
    pub fn from_outcomes(outcomes: Vec<HostOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.succeeded).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            reason: None,
            hosts: outcomes,
        }
    }

    /// Summary for a job whose filter matched no devices.
    pub fn no_targets() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            reason: Some(REASON_NO_TARGETS.to_string()),
            hosts: Vec::new(),
        }
    }

    /// Summary for a job that failed before any per-host work began.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            reason: Some(reason.into()),
            hosts: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(host: &str) -> HostOutcome {
        HostOutcome::success(1, host, 10, None)
    }

    fn err(host: &str) -> HostOutcome {
        HostOutcome::failure(2, host, 10, "connect", "unreachable")
    }

    #[test]
    fn all_success_folds_to_success() {
        assert_eq!(
            fold_outcomes(&[ok("a"), ok("b"), ok("c")]),
            AggregateStatus::Success
        );
    }

    #[test]
    fn mixed_folds_to_partial() {
        assert_eq!(fold_outcomes(&[ok("a"), err("b")]), AggregateStatus::Partial);
    }

    #[test]
    fn all_failed_folds_to_failed() {
        assert_eq!(fold_outcomes(&[err("a"), err("b")]), AggregateStatus::Failed);
    }

    #[test]
    fn empty_folds_to_failed() {
        assert_eq!(fold_outcomes(&[]), AggregateStatus::Failed);
    }

    #[test]
    fn summary_counts_match_outcomes() {
        let summary = ResultSummary::from_outcomes(vec![ok("a"), err("b"), ok("c")]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.reason.is_none());
    }

    #[test]
    fn no_targets_summary_carries_marker() {
        let summary = ResultSummary::no_targets();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.reason.as_deref(), Some(REASON_NO_TARGETS));
    }

    #[test]
    fn summary_serializes_counts() {
        let summary = ResultSummary::from_outcomes(vec![ok("a")]);
        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["total"], 1);
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failed"], 0);
    }
}
