//! Edges - typed connections between nodes.
//!
//! ```text
//! 1. Broadcast   A ──────────────┬────▶ B
//!                                ├────▶ C   (identical copy each)
//!                                └────▶ D
//! 2. Fan-In      A ───┐
//!                B ───┼──────────────▶ D   (one invocation per message)
//!                C ───┘
//! 3. Terminal    A ──────────────────▶ caller (yielded once)
//! ```
//!
//! [`Edge`] describes the topology of a graph; [`Outbox`] is the routing
//! half a node task uses to deliver what its handler forwards.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

use super::gate::ReleaseGate;
use super::node::NodeId;
use crate::error::{OrchestratorError, Result};

// ============================================================================
// EDGE DESCRIPTION
// ============================================================================

/// The shape of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// One source, many targets, identical message to each.
    Broadcast,
    /// Many sources, one target.
    FanIn,
    /// One source yielding the run's output to the caller.
    Terminal,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Broadcast => write!(f, "Broadcast"),
            EdgeKind::FanIn => write!(f, "FanIn"),
            EdgeKind::Terminal => write!(f, "Terminal"),
        }
    }
}

/// A declared edge of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub sources: Vec<NodeId>,
    pub targets: Vec<NodeId>,
    /// Whether targets are held until the broadcast has completed.
    pub release_after_send: bool,
}

impl Edge {
    pub fn broadcast(source: NodeId, targets: Vec<NodeId>) -> Self {
        Self {
            kind: EdgeKind::Broadcast,
            sources: vec![source],
            targets,
            release_after_send: false,
        }
    }

    /// Mark the targets as held until the broadcast has been fully sent.
    pub fn with_release(mut self) -> Self {
        self.release_after_send = true;
        self
    }

    pub fn fan_in(sources: Vec<NodeId>, target: NodeId) -> Self {
        Self {
            kind: EdgeKind::FanIn,
            sources,
            targets: vec![target],
            release_after_send: false,
        }
    }

    pub fn terminal(source: NodeId) -> Self {
        Self {
            kind: EdgeKind::Terminal,
            sources: vec![source],
            targets: Vec::new(),
            release_after_send: false,
        }
    }

    #[allow(dead_code)] // Topology query, used when inspecting a built graph
    pub fn connects(&self, source: &NodeId, target: &NodeId) -> bool {
        self.sources.contains(source) && self.targets.contains(target)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets = if self.kind == EdgeKind::Terminal {
            "caller".to_string()
        } else {
            join_ids(&self.targets)
        };
        write!(
            f,
            "{} [{}] → [{}]",
            self.kind,
            join_ids(&self.sources),
            targets
        )
    }
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// INBOX
// ============================================================================

/// Sending handle to one node's mailbox.
#[derive(Debug)]
pub struct Inbox<T> {
    node: NodeId,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Inbox<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T> Inbox<T> {
    /// Create a mailbox for `node` and return its sending and receiving halves.
    pub fn channel(node: NodeId, capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { node, tx }, rx)
    }

    /// Queue a message for the node.
    pub async fn deliver(&self, message: T, from: &NodeId) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| OrchestratorError::Delivery {
                from: from.clone(),
                to: self.node.clone(),
            })
    }
}

// ============================================================================
// OUTBOX
// ============================================================================

/// Routing half of a node's outgoing edge.
pub enum Outbox<T> {
    Broadcast {
        targets: Vec<Inbox<T>>,
        release: Option<ReleaseGate>,
    },
    FanIn(Inbox<T>),
    Terminal(Option<oneshot::Sender<T>>),
}

impl<T: Clone + Send> Outbox<T> {
    pub fn broadcast(targets: Vec<Inbox<T>>) -> Self {
        Outbox::Broadcast {
            targets,
            release: None,
        }
    }

    /// Release `gate` once a broadcast has reached every target.
    pub fn with_release(self, gate: ReleaseGate) -> Self {
        match self {
            Outbox::Broadcast { targets, .. } => Outbox::Broadcast {
                targets,
                release: Some(gate),
            },
            other => other,
        }
    }

    pub fn fan_in(target: Inbox<T>) -> Self {
        Outbox::FanIn(target)
    }

    pub fn terminal(tx: oneshot::Sender<T>) -> Self {
        Outbox::Terminal(Some(tx))
    }

    /// Route a forwarded value.
    pub async fn deliver(&mut self, value: T, from: &NodeId) -> Result<()> {
        match self {
            Outbox::Broadcast { targets, release } => {
                try_join_all(
                    targets
                        .iter()
                        .map(|inbox| inbox.deliver(value.clone(), from)),
                )
                .await?;

                if let Some(gate) = release.take() {
                    gate.release();
                }
                Ok(())
            }
            Outbox::FanIn(target) => target.deliver(value, from).await,
            Outbox::Terminal(slot) => {
                let tx = slot
                    .take()
                    .ok_or_else(|| OrchestratorError::OutputAlreadyYielded(from.clone()))?;
                tx.send(value).map_err(|_| OrchestratorError::Delivery {
                    from: from.clone(),
                    to: NodeId::caller(),
                })
            }
        }
    }
}
