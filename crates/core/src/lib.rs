//! Pure domain types for the netfleet orchestration core.
//!
//! This crate has no internal dependencies and no I/O. Everything here is
//! data and pure functions: identifiers, the error taxonomy, the target
//! filter grammar, per-job-type payloads, host descriptors, outcome folding,
//! and credential sealing.

pub mod error;
pub mod filter;
pub mod host;
pub mod outcome;
pub mod payload;
pub mod secrets;
pub mod types;

pub use error::CoreError;
