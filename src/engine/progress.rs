//! Progress channel - lifecycle events for observers.
//!
//! Events are fire-and-forget: sinks must not block and the engine never
//! waits on them. Any `Fn(ProgressEvent)` closure is a sink.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::node::NodeId;
use crate::models::{ProgressEvent, ProgressPhase};

/// Completion description of an invocation that forwarded output.
pub const FORWARDED: &str = "forwarded output";

/// Completion description of an invocation that produced nothing.
pub const WAITING: &str = "waiting for remaining inputs";

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel.
#[allow(dead_code)] // For embedders that consume events asynchronously
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

#[allow(dead_code)] // For embedders that consume events asynchronously
impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        // A closed receiver only means nobody is watching any more.
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event.phase {
            ProgressPhase::Started => debug!("[{}] {}", event.node_id, event.description),
            ProgressPhase::Completed => info!("[{}] {}", event.node_id, event.description),
            ProgressPhase::Failed => warn!("[{}] {}", event.node_id, event.description),
        }
    }
}

/// Emits events on behalf of one node.
#[derive(Clone)]
pub struct ProgressEmitter {
    node: NodeId,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressEmitter {
    pub fn new(node: NodeId, sink: Arc<dyn ProgressSink>) -> Self {
        Self { node, sink }
    }

    pub fn started(&self, description: impl Into<String>) {
        self.emit(ProgressPhase::Started, description);
    }

    pub fn completed(&self, description: impl Into<String>) {
        self.emit(ProgressPhase::Completed, description);
    }

    pub fn failed(&self, description: impl Into<String>) {
        self.emit(ProgressPhase::Failed, description);
    }

    fn emit(&self, phase: ProgressPhase, description: impl Into<String>) {
        self.sink
            .emit(ProgressEvent::new(self.node.clone(), phase, description));
    }
}
