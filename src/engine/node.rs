//! Node trait - the unit of work in an analysis graph.
//!
//! A node receives typed input from its mailbox and answers every
//! invocation with an [`Outcome`]: either a value to forward along its
//! outgoing edge, or `Wait` to decline producing output this time.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Upper { id: NodeId }
//!
//! #[async_trait]
//! impl Node for Upper {
//!     type Input = String;
//!     type Output = String;
//!
//!     fn id(&self) -> &NodeId { &self.id }
//!     fn kind(&self) -> NodeKind { NodeKind::Worker }
//!     fn describe(&self, input: &String) -> String { format!("uppercasing {}", input) }
//!
//!     async fn handle(&mut self, input: String, _ctx: &NodeContext) -> Result<Outcome<String>> {
//!         Ok(Outcome::Forward(input.to_uppercase()))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::progress::ProgressEmitter;
use super::state::RunStateStore;
use crate::error::Result;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Pseudo-node used as the sender of the initial request.
    pub fn caller() -> Self {
        Self::new("caller")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Role of a node in the analysis graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Dispatcher,
    Worker,
    Aggregator,
    Coordinator,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Dispatcher => write!(f, "Dispatcher"),
            NodeKind::Worker => write!(f, "Worker"),
            NodeKind::Aggregator => write!(f, "Aggregator"),
            NodeKind::Coordinator => write!(f, "Coordinator"),
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of one handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Route the value along the node's outgoing edge.
    Forward(T),
    /// Produce nothing for this invocation.
    Wait,
}

impl<T> Outcome<T> {
    #[allow(dead_code)] // Convenience for handler callers
    pub fn is_forward(&self) -> bool {
        matches!(self, Outcome::Forward(_))
    }

    /// Returns the forwarded value, if any.
    #[allow(dead_code)] // Convenience for handler callers
    pub fn into_forwarded(self) -> Option<T> {
        match self {
            Outcome::Forward(value) => Some(value),
            Outcome::Wait => None,
        }
    }
}

// ============================================================================
// NODE CONTEXT
// ============================================================================

/// Run-scoped services handed to every handler invocation.
#[derive(Clone)]
pub struct NodeContext {
    node: NodeId,
    cancel: CancellationToken,
    state: Arc<RunStateStore>,
    progress: ProgressEmitter,
}

impl NodeContext {
    pub fn new(
        node: NodeId,
        cancel: CancellationToken,
        state: Arc<RunStateStore>,
        progress: ProgressEmitter,
    ) -> Self {
        Self {
            node,
            cancel,
            state,
            progress,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node
    }

    /// The run's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The run's state store.
    pub fn state(&self) -> &RunStateStore {
        &self.state
    }

    pub fn progress(&self) -> &ProgressEmitter {
        &self.progress
    }
}

// ============================================================================
// NODE TRAIT
// ============================================================================

/// A node in the analysis graph.
///
/// The engine moves each node into its own task and feeds it one message
/// at a time, so `handle` takes `&mut self` and may keep local state
/// without locking.
#[async_trait]
pub trait Node: Send + 'static {
    /// Message type accepted from incoming edges.
    type Input: Send + 'static;

    /// Message type routed along the outgoing edge.
    type Output: Clone + Send + 'static;

    fn id(&self) -> &NodeId;

    fn kind(&self) -> NodeKind;

    /// Human-readable description of an invocation, used for progress events.
    fn describe(&self, input: &Self::Input) -> String;

    /// Process one message.
    async fn handle(
        &mut self,
        input: Self::Input,
        ctx: &NodeContext,
    ) -> Result<Outcome<Self::Output>>;

    /// Called once when the node's deadline elapses, if one was configured.
    async fn on_deadline(&mut self, _ctx: &NodeContext) -> Result<Outcome<Self::Output>> {
        Ok(Outcome::Wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::from("aggregator");
        assert_eq!(id.to_string(), "aggregator");
        assert_eq!(id.as_str(), "aggregator");
        assert_eq!(NodeId::caller().as_str(), "caller");
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(Outcome::Forward(1).is_forward());
        assert!(!Outcome::<u8>::Wait.is_forward());
        assert_eq!(Outcome::Forward("x").into_forwarded(), Some("x"));
        assert_eq!(Outcome::<&str>::Wait.into_forwarded(), None);
    }
}
