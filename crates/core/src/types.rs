use chrono::{DateTime, Utc};

/// Database identifier type matching BIGSERIAL/BIGINT columns.
pub type DbId = i64;

/// Tenant identifier. Every device, credential, region, and job belongs to
/// exactly one tenant; cross-tenant references are never valid.
pub type TenantId = DbId;

/// UTC timestamp type used across all models.
pub type Timestamp = DateTime<Utc>;

/// Per-job log sequence number assigned by the ledger.
pub type LogSequence = i64;
