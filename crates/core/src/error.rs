use crate::types::DbId;

/// Domain-level error taxonomy for the orchestration core.
///
/// Per-host operation failures are deliberately absent: they are recorded as
/// failed host outcomes inside the task executor and never propagate as an
/// `Err` out of it.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Entity lookup miss, scoped to the caller's tenant.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// Malformed submission, rejected before any job row is created.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A status move not present in the job state machine's transition
    /// table, evaluated against the currently persisted status. Also the
    /// error the loser of a finalization race receives.
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: DbId,
        from: &'static str,
        to: &'static str,
    },

    /// Cancellation of a job that already reached a terminal status.
    #[error("Job {job_id} is already terminal ({status})")]
    AlreadyTerminal { job_id: DbId, status: &'static str },

    /// The device directory could not be queried at execution time. The job
    /// finalizes as failed with this reason; there is no partial host list.
    #[error("Inventory resolution failed: {0}")]
    Resolution(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
