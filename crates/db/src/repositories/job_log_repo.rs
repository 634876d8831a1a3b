//! Repository for the append-only `job_log_entries` table.
//!
//! Sequence numbers are assigned by [`JobRepo`](super::JobRepo) inside the
//! same transaction as the insert; this module only reads.

use netfleet_core::types::{DbId, LogSequence};
use sqlx::PgPool;

use crate::models::job_log::JobLogEntry;

/// PostgreSQL notification channel carrying freshly appended entries as
/// JSON payloads. NOTIFY fires on commit, so listeners only ever see
/// durable entries.
pub const JOB_LOG_CHANNEL: &str = "netfleet_job_logs";

/// Column list for `job_log_entries` queries.
pub(crate) const LOG_COLUMNS: &str = "id, job_id, seq, ts, level_id, host, message, extra";

/// Read access to persisted job log entries.
pub struct JobLogRepo;

impl JobLogRepo {
    /// All entries for a job with `seq > after`, in sequence order.
    ///
    /// `after = 0` returns the full log. Used by polling clients and by
    /// subscription replay/backfill.
    pub async fn since(
        pool: &PgPool,
        job_id: DbId,
        after: LogSequence,
    ) -> Result<Vec<JobLogEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM job_log_entries \
             WHERE job_id = $1 AND seq > $2 \
             ORDER BY seq ASC"
        );
        sqlx::query_as::<_, JobLogEntry>(&query)
            .bind(job_id)
            .bind(after)
            .fetch_all(pool)
            .await
    }
}
