//! Per-job log broadcast with durable replay.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use netfleet_core::types::{DbId, LogSequence};
use netfleet_db::models::job_log::{JobLogEntry, NewLogEntry};
use tokio::sync::{broadcast, RwLock};

use crate::store::{LogStore, StoreError};

/// Default buffer capacity for each per-job broadcast channel.
///
/// A subscriber that falls further behind observes `Lagged` and recovers
/// by backfilling from the durable log, so overflow degrades latency, not
/// correctness.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Publish/subscribe hub for job log entries.
///
/// `publish` appends through the [`LogStore`] (the ledger assigns the
/// sequence) and then broadcasts; `deliver` broadcasts entries persisted
/// elsewhere (the notify listener's path). Shared via `Arc`.
pub struct LogFanout {
    store: Arc<dyn LogStore>,
    capacity: usize,
    channels: RwLock<HashMap<DbId, broadcast::Sender<JobLogEntry>>>,
}

impl LogFanout {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self::with_capacity(store, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn LogStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Durably append an entry and push it to live subscribers.
    ///
    /// Returns `Ok(None)` when the ledger dropped the append because the
    /// job is already terminal; nothing is broadcast in that case.
    pub async fn publish(&self, entry: NewLogEntry) -> Result<Option<JobLogEntry>, StoreError> {
        let persisted = self.store.append(entry).await?;
        if let Some(entry) = &persisted {
            self.deliver(entry.clone()).await;
        }
        Ok(persisted)
    }

    /// Push an already persisted entry to live subscribers.
    ///
    /// Subscriptions drop duplicates and backfill gaps by sequence, so
    /// delivering an entry twice (local echo plus notify bridge) is
    /// harmless.
    pub async fn deliver(&self, entry: JobLogEntry) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(&entry.job_id) {
            // SendError only means there are no live receivers.
            let _ = tx.send(entry);
        }
    }

    /// Subscribe to one job's log.
    ///
    /// The subscription yields every persisted entry in sequence order,
    /// then live entries as they are published, with no gap and no
    /// duplicate at the seam: the live receiver is registered *before* the
    /// replay snapshot is taken, and entries caught by both are dropped by
    /// sequence comparison.
    pub async fn subscribe(&self, job_id: DbId) -> Result<LogSubscription, StoreError> {
        let rx = {
            let mut channels = self.channels.write().await;
            channels
                .entry(job_id)
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        let replay = self.store.since(job_id, 0).await?;

        Ok(LogSubscription {
            store: Arc::clone(&self.store),
            job_id,
            pending: replay.into(),
            rx,
            last: 0,
            closed: false,
        })
    }

    /// Drop a finished job's channel. Existing subscribers drain the
    /// durable log and then observe end-of-stream.
    pub async fn retire(&self, job_id: DbId) {
        self.channels.write().await.remove(&job_id);
    }

    /// Number of jobs with an open channel.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

/// One subscriber's view of a job log: replayed entries, then live ones.
///
/// Yields entries in strictly increasing `seq` order with no gaps. On
/// broadcast lag, a missed notification, or out-of-order live delivery,
/// the missing range is backfilled from the durable store.
pub struct LogSubscription {
    store: Arc<dyn LogStore>,
    job_id: DbId,
    pending: VecDeque<JobLogEntry>,
    rx: broadcast::Receiver<JobLogEntry>,
    /// Highest sequence yielded so far.
    last: LogSequence,
    closed: bool,
}

impl LogSubscription {
    /// Next entry, or `None` once the channel is retired and the durable
    /// log is fully drained.
    pub async fn next(&mut self) -> Option<JobLogEntry> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                if entry.seq <= self.last {
                    continue;
                }
                self.last = entry.seq;
                return Some(entry);
            }

            if self.closed {
                return None;
            }

            match self.rx.recv().await {
                Ok(entry) => {
                    if entry.seq <= self.last {
                        continue;
                    }
                    if entry.seq == self.last + 1 {
                        self.last = entry.seq;
                        return Some(entry);
                    }
                    // Gap ahead of us; the entry is already durable, so the
                    // backfill below includes it.
                    self.backfill().await;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(
                        job_id = self.job_id,
                        missed,
                        "Log subscriber lagged; backfilling from the ledger",
                    );
                    self.backfill().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    // Channel retired. Pick up anything persisted after the
                    // last broadcast we saw, then end the stream.
                    self.closed = true;
                    self.backfill().await;
                }
            }
        }
    }

    async fn backfill(&mut self) {
        match self.store.since(self.job_id, self.last).await {
            Ok(entries) => self.pending.extend(entries),
            Err(e) => {
                tracing::warn!(
                    job_id = self.job_id,
                    error = %e,
                    "Log backfill failed; stream may pause until the next live entry",
                );
            }
        }
    }
}
