//! PostgreSQL notification bridge for cross-process log delivery.
//!
//! Workers append entries (and their `pg_notify`) in one transaction; this
//! listener receives them on commit and re-broadcasts into the local
//! fan-out channels, so API-side subscribers see entries produced by any
//! worker process.
//!
//! Delivery guarantees follow `LISTEN/NOTIFY`: notifications sent while
//! the connection is down are lost. Subscriptions tolerate that; any gap
//! is backfilled from the durable log.

use std::sync::Arc;
use std::time::Duration;

use netfleet_db::models::job_log::JobLogEntry;
use netfleet_db::repositories::JOB_LOG_CHANNEL;
use netfleet_db::DbPool;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

use crate::fanout::LogFanout;

/// Delay before retrying after a listener connection error.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Long-lived `LISTEN` task feeding the local [`LogFanout`].
pub struct LogNotifyListener {
    listener: PgListener,
}

impl LogNotifyListener {
    /// Connect with the pool's configuration and start listening on the
    /// job log channel.
    pub async fn connect(pool: &DbPool) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(JOB_LOG_CHANNEL).await?;
        Ok(Self { listener })
    }

    /// Run until cancelled, delivering each notification payload into the
    /// fan-out. Malformed payloads are logged and skipped.
    pub async fn run(mut self, fanout: Arc<LogFanout>, cancel: CancellationToken) {
        tracing::info!(channel = JOB_LOG_CHANNEL, "Log notify listener started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Log notify listener shutting down");
                    break;
                }
                notification = self.listener.recv() => match notification {
                    Ok(n) => match serde_json::from_str::<JobLogEntry>(n.payload()) {
                        Ok(entry) => fanout.deliver(entry).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring malformed log notification");
                        }
                    },
                    Err(e) => {
                        // PgListener reconnects internally; notifications in
                        // the outage window are covered by subscription
                        // backfill.
                        tracing::warn!(error = %e, "Log listener connection error");
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
    }
}
