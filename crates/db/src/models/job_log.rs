//! Append-only job log entries.

use netfleet_core::types::{DbId, LogSequence, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{LogLevel, StatusId};

/// A row from the `job_log_entries` table.
///
/// `Deserialize` is implemented because entries also travel as the
/// `pg_notify` payload between processes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub id: DbId,
    pub job_id: DbId,
    /// Ledger-assigned sequence, strictly increasing per job.
    pub seq: LogSequence,
    pub ts: Timestamp,
    pub level_id: StatusId,
    /// Target host for per-host lines; `None` for job-level messages.
    pub host: Option<String>,
    pub message: String,
    pub extra: Option<serde_json::Value>,
}

impl JobLogEntry {
    pub fn level(&self) -> Option<LogLevel> {
        LogLevel::from_id(self.level_id)
    }
}

/// Input for appending one log entry; the ledger assigns `seq` and `ts`.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub job_id: DbId,
    pub level: LogLevel,
    pub host: Option<String>,
    pub message: String,
    pub extra: Option<serde_json::Value>,
}

impl NewLogEntry {
    /// Job-level entry with no host attribution.
    pub fn job_level(job_id: DbId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            job_id,
            level,
            host: None,
            message: message.into(),
            extra: None,
        }
    }

    /// Entry attributed to one target host.
    pub fn for_host(
        job_id: DbId,
        level: LogLevel,
        host: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            level,
            host: Some(host.into()),
            message: message.into(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}
