//! Graph build step - one fresh graph per run.
//!
//! ```text
//!                         ┌──▶ worker:A ──┐
//!   caller ─▶ dispatcher ─┼──▶ worker:B ──┼──▶ aggregator ─▶ coordinator ─▶ caller
//!             (broadcast, └──▶ worker:C ──┘    (fan-in)
//!              then release)
//! ```
//!
//! The dispatcher's expected count and both the fan-out and fan-in edges
//! are derived from the same descriptor list, so they cannot disagree.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::aggregator::Aggregator;
use super::coordinator::{Coordinator, SynthesisTemplate, Synthesizer};
use super::dispatcher::Dispatcher;
use super::worker::{worker_node_id, WorkerDescriptor, WorkerNode};
use super::RunOptions;
use crate::engine::{
    Edge, Engine, Inbox, Node, NodeId, NodeOptions, Outbox, ProgressSink, ReleaseGate,
    RunStateStore,
};
use crate::error::{OrchestratorError, Result};
use crate::models::{AnalysisRequest, FinalReport};

/// A validated, not yet executed analysis graph.
pub struct AnalysisGraph {
    workers: Vec<WorkerDescriptor>,
    synthesizer: Arc<dyn Synthesizer>,
    template: SynthesisTemplate,
    options: RunOptions,
    edges: Vec<Edge>,
}

impl AnalysisGraph {
    /// Validate the worker set and lay out the edges.
    pub fn build(
        workers: Vec<WorkerDescriptor>,
        synthesizer: Arc<dyn Synthesizer>,
        template: SynthesisTemplate,
        options: RunOptions,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(OrchestratorError::NoWorkersEnabled);
        }

        let mut names = HashSet::new();
        for worker in &workers {
            if !names.insert(worker.name.as_str()) {
                return Err(OrchestratorError::DuplicateWorker(worker.name.clone()));
            }
        }

        let worker_ids: Vec<NodeId> = workers.iter().map(|w| worker_node_id(&w.name)).collect();
        let edges = vec![
            Edge::broadcast(NodeId::from("dispatcher"), worker_ids.clone()).with_release(),
            Edge::fan_in(worker_ids, NodeId::from("aggregator")),
            Edge::fan_in(vec![NodeId::from("aggregator")], NodeId::from("coordinator")),
            Edge::terminal(NodeId::from("coordinator")),
        ];

        Ok(Self {
            workers,
            synthesizer,
            template,
            options,
            edges,
        })
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name.clone()).collect()
    }

    pub fn expected_worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wire mailboxes, spawn every node and run the graph once.
    pub async fn execute(
        self,
        request: AnalysisRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<FinalReport> {
        for edge in self.edges() {
            debug!("edge: {}", edge);
        }

        let capacity = self.options.mailbox_capacity;
        let expected_workers = self.expected_worker_count();
        let mut engine = Engine::new(cancel, Arc::new(RunStateStore::new()), progress);

        let dispatcher = Dispatcher::new(self.worker_names())?;
        let aggregator = Aggregator::new();
        let coordinator = Coordinator::new(self.synthesizer, self.template);

        let (entry, dispatcher_rx) = Inbox::channel(dispatcher.id().clone(), 1);
        let (aggregator_inbox, aggregator_rx) =
            Inbox::channel(aggregator.id().clone(), capacity.max(expected_workers));
        let (coordinator_inbox, coordinator_rx) = Inbox::channel(coordinator.id().clone(), 1);
        let (output_tx, output_rx) = oneshot::channel();
        let gate = ReleaseGate::new();

        let mut worker_inboxes = Vec::with_capacity(self.workers.len());
        for descriptor in self.workers {
            let node = WorkerNode::new(descriptor);
            let (inbox, rx) = Inbox::channel(node.id().clone(), capacity);
            worker_inboxes.push(inbox);
            engine.spawn(
                node,
                rx,
                Outbox::fan_in(aggregator_inbox.clone()),
                NodeOptions::held(gate.waiter()),
            );
        }

        engine.spawn(
            dispatcher,
            dispatcher_rx,
            Outbox::broadcast(worker_inboxes).with_release(gate),
            NodeOptions::default(),
        );

        let deadline = self.options.deadline.map(|d| Instant::now() + d);
        engine.spawn(
            aggregator,
            aggregator_rx,
            Outbox::fan_in(coordinator_inbox),
            NodeOptions::with_deadline(deadline),
        );
        // Only worker tasks may keep the aggregator's mailbox open.
        drop(aggregator_inbox);

        engine.spawn(
            coordinator,
            coordinator_rx,
            Outbox::terminal(output_tx),
            NodeOptions::default(),
        );
        debug!("spawned {} nodes", engine.node_count());

        entry.deliver(request, &NodeId::caller()).await?;
        drop(entry);

        engine.run_until_output(output_rx).await
    }
}
