//! Error taxonomy for analysis runs.
//!
//! Validation errors are raised before any message is routed. Everything
//! after the broadcast is fatal to the run and surfaces as a single error
//! to the caller of `Orchestrator::run_analysis`.

use crate::engine::NodeId;
use thiserror::Error;

/// Errors produced while building or executing an analysis run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request failed validation (e.g. empty subject identifier).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Worker selection produced an empty set.
    #[error("No workers enabled for this run")]
    NoWorkersEnabled,

    /// Two workers in the same run share a name.
    #[error("Worker '{0}' is registered more than once")]
    DuplicateWorker(String),

    /// A worker's external call failed.
    #[error("Worker '{worker}' failed: {source}")]
    WorkerFailure {
        worker: String,
        #[source]
        source: anyhow::Error,
    },

    /// The synthesis call failed after all workers succeeded.
    #[error("Synthesis failed: {source}")]
    SynthesisFailure {
        #[source]
        source: anyhow::Error,
    },

    /// The run deadline elapsed before any worker produced a result.
    #[error("Deadline exceeded with {received} of {expected} worker results")]
    DeadlineExceeded { received: usize, expected: usize },

    /// The run was cancelled through its cancellation token.
    #[error("Run cancelled")]
    Cancelled,

    /// A message could not be delivered because the target mailbox is gone.
    #[error("Failed to deliver message from {from} to {to}")]
    Delivery { from: NodeId, to: NodeId },

    /// A node tried to yield terminal output twice.
    #[error("Node {0} yielded terminal output more than once")]
    OutputAlreadyYielded(NodeId),

    /// Every node finished without yielding terminal output.
    #[error("Run finished without producing a report")]
    NoOutput,

    /// A write-once run state key was written twice.
    #[error("Run state key '{0}' has already been written")]
    StateConflict(String),

    /// A run state key was read before it was written.
    #[error("Run state key '{0}' has not been written")]
    StateMissing(String),

    /// A run state value could not be (de)serialized.
    #[error("Run state serialization error: {0}")]
    State(#[from] serde_json::Error),

    /// A node task panicked.
    #[error("Node task panicked: {0}")]
    NodePanicked(String),
}

impl OrchestratorError {
    /// Build an `InvalidRequest` error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Whether this error only reflects a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for orchestration code.
pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_failure_keeps_source() {
        let err = OrchestratorError::WorkerFailure {
            worker: "News".to_string(),
            source: anyhow::anyhow!("connection reset"),
        };

        assert_eq!(err.to_string(), "Worker 'News' failed: connection reset");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_cancelled() {
        assert!(OrchestratorError::Cancelled.is_cancelled());
        assert!(!OrchestratorError::NoWorkersEnabled.is_cancelled());
    }
}
