//! Durable storage seam behind the fan-out.

use async_trait::async_trait;
use netfleet_core::types::{DbId, LogSequence};
use netfleet_db::models::job_log::{JobLogEntry, NewLogEntry};
use netfleet_db::repositories::{JobLogRepo, JobRepo};
use netfleet_db::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable, sequence-assigning log storage.
///
/// `append` is the ledger write path: it assigns the next per-job sequence
/// and returns `Ok(None)` when the entry was dropped because the job is
/// already terminal (late-arriving worker messages are tolerated, not
/// errors).
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, entry: NewLogEntry) -> Result<Option<JobLogEntry>, StoreError>;

    /// Entries with `seq > after`, in sequence order.
    async fn since(
        &self,
        job_id: DbId,
        after: LogSequence,
    ) -> Result<Vec<JobLogEntry>, StoreError>;
}

/// The production store: the PostgreSQL job ledger.
pub struct PgLogStore {
    pool: DbPool,
}

impl PgLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn append(&self, entry: NewLogEntry) -> Result<Option<JobLogEntry>, StoreError> {
        Ok(JobRepo::append_log(&self.pool, &entry).await?)
    }

    async fn since(
        &self,
        job_id: DbId,
        after: LogSequence,
    ) -> Result<Vec<JobLogEntry>, StoreError> {
        Ok(JobLogRepo::since(&self.pool, job_id, after).await?)
    }
}
