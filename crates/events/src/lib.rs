//! Log fan-out for job execution.
//!
//! Every log line a job produces is durably appended through the ledger and
//! simultaneously pushed to a per-job broadcast channel. Subscribers first
//! replay the persisted log, then receive live entries, with no gap and no
//! duplicate at the seam. A PostgreSQL `LISTEN/NOTIFY` bridge carries
//! entries persisted by other processes into the local channels.

pub mod fanout;
pub mod memory;
pub mod notify;
pub mod store;

pub use fanout::{LogFanout, LogSubscription};
pub use memory::MemoryLogStore;
pub use notify::LogNotifyListener;
pub use store::{LogStore, PgLogStore, StoreError};
