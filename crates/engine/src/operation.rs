//! The seam to external device-protocol clients.
//!
//! A [`DeviceOperation`] performs exactly one protocol-level action against
//! one device. Retry policy, session pooling, and protocol details live in
//! the implementing collaborator, never here; the executor only bounds,
//! times, and records the calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use netfleet_core::host::HostDescriptor;
use netfleet_core::outcome::ERROR_CODE_TIMEOUT;
use netfleet_core::payload::{JobType, OperationPayload};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure class of a single device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationErrorKind {
    /// The per-host deadline elapsed. Raised by the executor, not by
    /// operations themselves.
    Timeout,
    /// The device could not be reached or authenticated.
    Connect,
    /// The device answered but the action failed.
    Protocol,
}

impl OperationErrorKind {
    /// Stable machine-readable code recorded in host outcomes.
    pub fn code(self) -> &'static str {
        match self {
            OperationErrorKind::Timeout => ERROR_CODE_TIMEOUT,
            OperationErrorKind::Connect => "connect",
            OperationErrorKind::Protocol => "protocol",
        }
    }
}

/// Error from one device operation, isolated to one host.
#[derive(Debug, thiserror::Error)]
#[error("{}: {message}", kind.code())]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: OperationErrorKind::Connect,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: OperationErrorKind::Protocol,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation trait and output
// ---------------------------------------------------------------------------

/// Result data from a successful device operation.
#[derive(Debug, Clone, Default)]
pub struct OperationOutput {
    /// Opaque per-type result (command output, backup contents, discovered
    /// neighbors, ...). Folded into the host outcome unchanged.
    pub data: Option<serde_json::Value>,
}

impl OperationOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_data(data: serde_json::Value) -> Self {
        Self { data: Some(data) }
    }
}

/// One protocol-level action against one device.
#[async_trait]
pub trait DeviceOperation: Send + Sync {
    async fn run(
        &self,
        host: &HostDescriptor,
        payload: &OperationPayload,
    ) -> Result<OperationOutput, OperationError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Job type to operation mapping, populated by the embedding binary.
///
/// A claimed job whose type has no registered operation finalizes as
/// `failed` before any per-host work; nothing is silently dropped.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<JobType, Arc<dyn DeviceOperation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, operation: Arc<dyn DeviceOperation>) {
        self.operations.insert(job_type, operation);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn DeviceOperation>> {
        self.operations.get(&job_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.operations.keys().copied().collect()
    }
}
