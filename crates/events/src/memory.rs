//! In-memory [`LogStore`] used by tests and embedded deployments.
//!
//! Mirrors the ledger's append semantics: sequences are assigned under a
//! lock, and appends to a job marked terminal are dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use netfleet_core::types::{DbId, LogSequence};
use netfleet_db::models::job_log::{JobLogEntry, NewLogEntry};

use crate::store::{LogStore, StoreError};

#[derive(Default)]
struct Inner {
    entries: HashMap<DbId, Vec<JobLogEntry>>,
    terminal: HashSet<DbId>,
    next_id: DbId,
}

/// Lock-protected in-memory log store.
#[derive(Default)]
pub struct MemoryLogStore {
    inner: Mutex<Inner>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a job terminal; later appends are dropped like the ledger's.
    pub fn mark_terminal(&self, job_id: DbId) {
        self.inner.lock().expect("store lock").terminal.insert(job_id);
    }

    /// Number of persisted entries for a job.
    pub fn len(&self, job_id: DbId) -> usize {
        self.inner
            .lock()
            .expect("store lock")
            .entries
            .get(&job_id)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, job_id: DbId) -> bool {
        self.len(job_id) == 0
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, entry: NewLogEntry) -> Result<Option<JobLogEntry>, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.terminal.contains(&entry.job_id) {
            return Ok(None);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        let log = inner.entries.entry(entry.job_id).or_default();
        let stored = JobLogEntry {
            id,
            job_id: entry.job_id,
            seq: log.len() as LogSequence + 1,
            ts: chrono::Utc::now(),
            level_id: entry.level.id(),
            host: entry.host,
            message: entry.message,
            extra: entry.extra,
        };
        log.push(stored.clone());
        Ok(Some(stored))
    }

    async fn since(
        &self,
        job_id: DbId,
        after: LogSequence,
    ) -> Result<Vec<JobLogEntry>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .entries
            .get(&job_id)
            .map(|log| {
                log.iter()
                    .filter(|e| e.seq > after)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default())
    }
}
