//! Repository for the `jobs` table: the job ledger.
//!
//! Status moves go through [`JobRepo::transition`] (or the claim path),
//! which enforces the transition table against the *currently persisted*
//! status in SQL, so two workers racing to finalize the same job cannot
//! both succeed: the loser's guarded UPDATE matches zero rows.
//!
//! Every transition and append also writes the corresponding log entry and
//! a `pg_notify` in the same transaction, so observers never see a status
//! change without its log line or vice versa.

use netfleet_core::error::CoreError;
use netfleet_core::outcome::ResultSummary;
use netfleet_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::job::{CancelOutcome, Job, JobListQuery, NewJob};
use crate::models::job_log::{JobLogEntry, NewLogEntry};
use crate::models::status::{JobStatus, LogLevel, StatusId};
use crate::repositories::job_log_repo::{JOB_LOG_CHANNEL, LOG_COLUMNS};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, tenant_id, job_type, status_id, requested_by, target_filter, payload, \
    result, assigned_region, requested_at, scheduled_for, started_at, \
    finished_at, cancel_requested_at, last_log_seq, created_at, updated_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("Database error: {e}"))
}

/// The job ledger: creation, claims, guarded transitions, log appends,
/// and cancellation flags.
pub struct JobRepo;

impl JobRepo {
    // -----------------------------------------------------------------------
    // Creation and lookup
    // -----------------------------------------------------------------------

    /// Create a job row. Jobs with a future `scheduled_for` start in
    /// `scheduled`, everything else in `queued`.
    pub async fn create(pool: &PgPool, input: &NewJob) -> Result<Job, sqlx::Error> {
        let status = match input.scheduled_for {
            Some(at) if at > chrono::Utc::now() => JobStatus::Scheduled,
            _ => JobStatus::Queued,
        };

        let target_filter = serde_json::to_value(&input.target_filter)
            .expect("target filter serialization is infallible");
        let payload =
            serde_json::to_value(&input.payload).expect("payload serialization is infallible");

        let query = format!(
            "INSERT INTO jobs \
                 (tenant_id, job_type, status_id, requested_by, target_filter, payload, scheduled_for) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.tenant_id)
            .bind(input.job_type.as_str())
            .bind(status.id())
            .bind(input.requested_by)
            .bind(target_filter)
            .bind(payload)
            .bind(input.scheduled_for)
            .fetch_one(pool)
            .await
    }

    /// Find a job by id without tenant scoping. Worker-side only; the API
    /// always goes through [`JobRepo::find_scoped`].
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by id within a tenant.
    pub async fn find_scoped(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// List a tenant's jobs, newest first, with optional status filter and
    /// pagination.
    pub async fn list(
        pool: &PgPool,
        tenant_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let mut conditions = vec!["tenant_id = $1".to_string()];
        let mut bind_idx: u32 = 2;

        if params.status_id.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE {} \
             ORDER BY requested_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            conditions.join(" AND "),
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Job>(&query).bind(tenant_id);
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    // -----------------------------------------------------------------------
    // Dispatch substrate
    // -----------------------------------------------------------------------

    /// Unrouted jobs that are due for a routing decision: `queued` or
    /// `scheduled` with the schedule elapsed, no region assigned, and no
    /// pending cancellation.
    pub async fn due_for_routing(pool: &PgPool, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE assigned_region IS NULL \
               AND status_id IN ($1, $2) \
               AND (scheduled_for IS NULL OR scheduled_for <= NOW()) \
               AND cancel_requested_at IS NULL \
             ORDER BY requested_at ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Queued.id())
            .bind(JobStatus::Scheduled.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Stamp the routing decision. Guarded on `assigned_region IS NULL`
    /// so concurrent dispatchers cannot double-route; returns `false` for
    /// the loser, whose resolution work is simply discarded.
    pub async fn assign_region(
        pool: &PgPool,
        job_id: DbId,
        region: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET assigned_region = $2, updated_at = NOW() \
             WHERE id = $1 AND assigned_region IS NULL AND status_id IN ($3, $4)",
        )
        .bind(job_id)
        .bind(region)
        .bind(JobStatus::Queued.id())
        .bind(JobStatus::Scheduled.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim the next routed, runnable job for one of the given
    /// worker pools, transitioning it to `running` and stamping
    /// `started_at`.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the
    /// same job. The synthetic status entry is written in the same
    /// transaction.
    pub async fn claim_next(pool: &PgPool, pools: &[String]) -> Result<Option<Job>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE jobs \
             SET status_id = $1, started_at = NOW(), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status_id IN ($2, $3) \
                   AND assigned_region = ANY($4) \
                   AND (scheduled_for IS NULL OR scheduled_for <= NOW()) \
                 ORDER BY requested_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running.id())
            .bind(JobStatus::Queued.id())
            .bind(JobStatus::Scheduled.id())
            .bind(pools)
            .fetch_optional(&mut *tx)
            .await?;

        let claimed = match claimed {
            Some(job) => job,
            None => return Ok(None),
        };

        Self::append_unchecked_tx(
            &mut tx,
            &NewLogEntry::job_level(
                claimed.id,
                LogLevel::Info,
                format!("Job status changed to {}", JobStatus::Running.name()),
            )
            .with_extra(serde_json::json!({ "status": JobStatus::Running.name() })),
        )
        .await?;

        tx.commit().await?;
        Ok(Some(claimed))
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Move a job to `new_status`, enforcing the transition table against
    /// the currently persisted status. Terminal transitions stamp
    /// `finished_at` and store the result summary.
    ///
    /// Returns the updated row and the synthetic status log entry written
    /// alongside it. The loser of a finalization race gets
    /// [`CoreError::InvalidTransition`] and the job is untouched.
    pub async fn transition(
        pool: &PgPool,
        job_id: DbId,
        new_status: JobStatus,
        result: Option<&ResultSummary>,
    ) -> Result<(Job, JobLogEntry), CoreError> {
        let sources: Vec<StatusId> = new_status.valid_sources().iter().map(|s| s.id()).collect();
        if sources.is_empty() {
            let current = Self::find_by_id(pool, job_id)
                .await
                .map_err(db_err)?
                .ok_or(CoreError::NotFound {
                    entity: "Job",
                    id: job_id,
                })?;
            return Err(invalid_transition(&current, new_status));
        }

        let mut tx = pool.begin().await.map_err(db_err)?;

        let set_clause = if new_status.is_terminal() {
            "status_id = $2, result = $3, finished_at = NOW(), updated_at = NOW()"
        } else if new_status == JobStatus::Running {
            "status_id = $2, started_at = NOW(), updated_at = NOW()"
        } else {
            "status_id = $2, updated_at = NOW()"
        };

        let query = format!(
            "UPDATE jobs SET {set_clause} \
             WHERE id = $1 AND status_id = ANY(${}) \
             RETURNING {COLUMNS}",
            if new_status.is_terminal() { 4 } else { 3 },
        );

        let mut q = sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(new_status.id());
        if new_status.is_terminal() {
            let summary = result
                .map(|r| serde_json::to_value(r).expect("summary serialization is infallible"));
            q = q.bind(summary);
        }
        let updated = q.bind(&sources).fetch_optional(&mut *tx).await.map_err(db_err)?;

        let updated = match updated {
            Some(job) => job,
            None => {
                drop(tx);
                let current = Self::find_by_id(pool, job_id)
                    .await
                    .map_err(db_err)?
                    .ok_or(CoreError::NotFound {
                        entity: "Job",
                        id: job_id,
                    })?;
                return Err(invalid_transition(&current, new_status));
            }
        };

        let level = match new_status {
            JobStatus::Failed => LogLevel::Error,
            JobStatus::Partial | JobStatus::Cancelled => LogLevel::Warn,
            _ => LogLevel::Info,
        };
        let entry = Self::append_unchecked_tx(
            &mut tx,
            &NewLogEntry::job_level(
                job_id,
                level,
                format!("Job status changed to {}", new_status.name()),
            )
            .with_extra(serde_json::json!({ "status": new_status.name() })),
        )
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok((updated, entry))
    }

    // -----------------------------------------------------------------------
    // Log appends
    // -----------------------------------------------------------------------

    /// Append one log entry, assigning the next sequence number.
    ///
    /// Appending to a job that already reached a terminal status is a
    /// logged no-op returning `Ok(None)`, tolerating late-arriving worker
    /// messages.
    pub async fn append_log(
        pool: &PgPool,
        input: &NewLogEntry,
    ) -> Result<Option<JobLogEntry>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let status_id: Option<StatusId> =
            sqlx::query_scalar("SELECT status_id FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(input.job_id)
                .fetch_optional(&mut *tx)
                .await?;

        let status_id = status_id.ok_or(sqlx::Error::RowNotFound)?;
        if JobStatus::from_id(status_id).is_some_and(JobStatus::is_terminal) {
            tracing::warn!(
                job_id = input.job_id,
                message = %input.message,
                "Dropping log append to terminal job",
            );
            return Ok(None);
        }

        let entry = Self::append_unchecked_tx(&mut tx, input).await?;
        tx.commit().await?;
        Ok(Some(entry))
    }

    /// Append within an existing transaction without the terminal-status
    /// check. Used by the transition/claim paths, which write their
    /// synthetic entry after the status row has already been updated.
    async fn append_unchecked_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &NewLogEntry,
    ) -> Result<JobLogEntry, sqlx::Error> {
        let conn: &mut PgConnection = tx;

        let seq: i64 = sqlx::query_scalar(
            "UPDATE jobs SET last_log_seq = last_log_seq + 1 WHERE id = $1 RETURNING last_log_seq",
        )
        .bind(input.job_id)
        .fetch_one(&mut *conn)
        .await?;

        let query = format!(
            "INSERT INTO job_log_entries (job_id, seq, level_id, host, message, extra) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {LOG_COLUMNS}"
        );
        let entry = sqlx::query_as::<_, JobLogEntry>(&query)
            .bind(input.job_id)
            .bind(seq)
            .bind(input.level.id())
            .bind(&input.host)
            .bind(&input.message)
            .bind(&input.extra)
            .fetch_one(&mut *conn)
            .await?;

        // NOTIFY is transactional: it fires on commit, after the entry is
        // durable, in commit order per channel.
        let payload = serde_json::to_string(&entry).expect("entry serialization is infallible");
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(JOB_LOG_CHANNEL)
            .bind(payload)
            .execute(&mut *conn)
            .await?;

        Ok(entry)
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel a job on behalf of a tenant.
    ///
    /// Jobs that have not started transition straight to `cancelled`;
    /// running jobs get the cooperative flag set and are finalized by the
    /// executing worker. Terminal jobs yield
    /// [`CoreError::AlreadyTerminal`] and are left untouched.
    pub async fn request_cancel(
        pool: &PgPool,
        tenant_id: DbId,
        job_id: DbId,
    ) -> Result<CancelOutcome, CoreError> {
        let current = Self::find_scoped(pool, tenant_id, job_id)
            .await
            .map_err(db_err)?
            .ok_or(CoreError::NotFound {
                entity: "Job",
                id: job_id,
            })?;

        let status = current
            .status()
            .ok_or_else(|| CoreError::Internal(format!("Job {job_id} has unknown status")))?;

        match status {
            JobStatus::Queued | JobStatus::Scheduled => {
                if Self::cancel_before_start(pool, job_id).await.map_err(db_err)? {
                    return Ok(CancelOutcome::CancelledImmediately);
                }
                // A worker claimed the job between our read and the guarded
                // update; fall through to the running path so the flag is
                // set instead of yanking the job out from under the worker.
                Self::flag_running_cancel(pool, job_id).await?;
                Ok(CancelOutcome::CancellationRequested)
            }
            JobStatus::Running => {
                Self::flag_running_cancel(pool, job_id).await?;
                Ok(CancelOutcome::CancellationRequested)
            }
            terminal => Err(CoreError::AlreadyTerminal {
                job_id,
                status: terminal.name(),
            }),
        }
    }

    /// Guarded immediate cancellation of a job that has not started.
    /// Returns `false` when the job left `queued`/`scheduled` in the
    /// meantime.
    async fn cancel_before_start(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let summary = serde_json::to_value(ResultSummary::aborted("cancelled before dispatch"))
            .expect("summary serialization is infallible");
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, result = $3, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5) \
             RETURNING {COLUMNS}"
        );
        let cancelled = sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobStatus::Cancelled.id())
            .bind(summary)
            .bind(JobStatus::Queued.id())
            .bind(JobStatus::Scheduled.id())
            .fetch_optional(&mut *tx)
            .await?;

        if cancelled.is_none() {
            return Ok(false);
        }

        Self::append_unchecked_tx(
            &mut tx,
            &NewLogEntry::job_level(
                job_id,
                LogLevel::Warn,
                format!("Job status changed to {}", JobStatus::Cancelled.name()),
            )
            .with_extra(serde_json::json!({ "status": JobStatus::Cancelled.name() })),
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Set the cooperative cancellation flag on a running job and record
    /// the request in the job log. Idempotent: a second request neither
    /// re-flags nor re-logs.
    async fn flag_running_cancel(pool: &PgPool, job_id: DbId) -> Result<(), CoreError> {
        let flagged = sqlx::query(
            "UPDATE jobs \
             SET cancel_requested_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND cancel_requested_at IS NULL AND status_id = $2",
        )
        .bind(job_id)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await
        .map_err(db_err)?;

        if flagged.rows_affected() > 0 {
            let note = NewLogEntry::job_level(
                job_id,
                LogLevel::Warn,
                "Cancellation requested; in-flight host operations will finish",
            );
            if let Err(e) = Self::append_log(pool, &note).await {
                tracing::warn!(job_id, error = %e, "Failed to log cancellation request");
            }
        }
        Ok(())
    }

    /// Whether a cooperative cancellation has been requested for the job.
    /// Polled by the executing worker between per-host dispatches.
    pub async fn cancel_requested(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT cancel_requested_at IS NOT NULL FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(pool)
            .await
            .map(|flag| flag.unwrap_or(false))
    }
}

fn invalid_transition(current: &Job, target: JobStatus) -> CoreError {
    CoreError::InvalidTransition {
        job_id: current.id,
        from: current.status().map(JobStatus::name).unwrap_or("unknown"),
        to: target.name(),
    }
}
