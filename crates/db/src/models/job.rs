//! Job row model and DTOs for the job ledger.

use netfleet_core::error::CoreError;
use netfleet_core::filter::TargetFilter;
use netfleet_core::outcome::ResultSummary;
use netfleet_core::payload::{JobType, OperationPayload};
use netfleet_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
///
/// This field set is the durable contract downstream consumers read;
/// renaming or removing a field breaks them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub tenant_id: DbId,
    pub job_type: String,
    pub status_id: StatusId,
    pub requested_by: DbId,
    pub target_filter: serde_json::Value,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub assigned_region: Option<String>,
    pub requested_at: Timestamp,
    pub scheduled_for: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub cancel_requested_at: Option<Timestamp>,
    pub last_log_seq: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Decode the stored status id. `None` only if the row predates the
    /// current lookup table, which would be a migration defect.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    /// Decode the job type column.
    pub fn job_type(&self) -> Result<JobType, CoreError> {
        JobType::parse(&self.job_type)
    }

    /// Decode the stored target filter.
    pub fn target_filter(&self) -> Result<TargetFilter, CoreError> {
        serde_json::from_value(self.target_filter.clone())
            .map_err(|e| CoreError::Internal(format!("Stored target filter is unreadable: {e}")))
    }

    /// Decode the stored operation payload.
    pub fn payload(&self) -> Result<OperationPayload, CoreError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| CoreError::Internal(format!("Stored payload is unreadable: {e}")))
    }

    /// Decode the stored result summary, if the job has finished.
    pub fn result_summary(&self) -> Option<ResultSummary> {
        self.result
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Input for creating a job row. Validation happens before this is built.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: DbId,
    pub job_type: JobType,
    pub target_filter: TargetFilter,
    pub payload: OperationPayload,
    pub requested_by: DbId,
    pub scheduled_for: Option<Timestamp>,
}

/// Query parameters for job listing.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status ID (e.g. 3 = running, 6 = failed).
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Outcome of a cancellation request against a non-terminal job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started; it is now `cancelled`.
    CancelledImmediately,
    /// The job is running; the cooperative flag is set and the executing
    /// worker will finalize it as `cancelled`.
    CancellationRequested,
}
