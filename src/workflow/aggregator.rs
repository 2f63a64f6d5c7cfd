//! Aggregator - fan-in barrier over worker results.
//!
//! Invoked once per arriving result. Results accumulate in node-local
//! state; the batch is forwarded exactly once, when the number of distinct
//! workers heard from reaches the expected count in the run state.
//!
//! ```text
//!   received < expected   ──▶ Wait
//!   received == expected  ──▶ Forward(batch)   (completed)
//!   after completion      ──▶ ignored, logged
//!   unknown worker name   ──▶ ignored, logged
//! ```

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::engine::{Node, NodeContext, NodeId, NodeKind, Outcome};
use crate::error::{OrchestratorError, Result};
use crate::models::{AggregatedBatch, WorkerResult};

pub struct Aggregator {
    id: NodeId,
    results: Vec<WorkerResult>,
    seen: HashSet<String>,
    completed: bool,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            id: NodeId::from("aggregator"),
            results: Vec::new(),
            seen: HashSet::new(),
            completed: false,
        }
    }

    /// Number of distinct worker results accepted so far.
    #[allow(dead_code)] // Barrier introspection
    pub fn received(&self) -> usize {
        self.results.len()
    }

    #[allow(dead_code)] // Barrier introspection
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn take_batch(&mut self, subject_id: String, missing: Vec<String>) -> AggregatedBatch {
        self.completed = true;
        AggregatedBatch {
            subject_id,
            results: std::mem::take(&mut self.results),
            missing,
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for Aggregator {
    type Input = WorkerResult;
    type Output = AggregatedBatch;

    fn id(&self) -> &NodeId {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Aggregator
    }

    fn describe(&self, result: &WorkerResult) -> String {
        format!("Collecting result from {}", result.worker_name)
    }

    async fn handle(
        &mut self,
        result: WorkerResult,
        ctx: &NodeContext,
    ) -> Result<Outcome<AggregatedBatch>> {
        if self.completed {
            warn!(
                "Ignoring late result from {}: batch already forwarded",
                result.worker_name
            );
            return Ok(Outcome::Wait);
        }

        let state = ctx.state().run_state().await?;
        if !state.worker_names.contains(&result.worker_name) {
            warn!(
                "Ignoring result from {}: not a worker of this run",
                result.worker_name
            );
            return Ok(Outcome::Wait);
        }
        if !self.seen.insert(result.worker_name.clone()) {
            warn!("Ignoring duplicate result from {}", result.worker_name);
            return Ok(Outcome::Wait);
        }

        self.results.push(result);
        let received = self.results.len();

        if received < state.expected_worker_count {
            debug!(
                "{} of {} worker results received",
                received, state.expected_worker_count
            );
            return Ok(Outcome::Wait);
        }

        info!("All {} worker results received", received);
        Ok(Outcome::Forward(self.take_batch(state.subject_id, Vec::new())))
    }

    async fn on_deadline(&mut self, ctx: &NodeContext) -> Result<Outcome<AggregatedBatch>> {
        if self.completed {
            return Ok(Outcome::Wait);
        }

        let state = ctx.state().run_state().await?;
        if self.results.is_empty() {
            return Err(OrchestratorError::DeadlineExceeded {
                received: 0,
                expected: state.expected_worker_count,
            });
        }

        let missing: Vec<String> = state
            .worker_names
            .iter()
            .filter(|name| !self.seen.contains(name.as_str()))
            .cloned()
            .collect();

        warn!(
            "Deadline reached with {} of {} results, missing: {}",
            self.results.len(),
            state.expected_worker_count,
            missing.join(", ")
        );
        Ok(Outcome::Forward(self.take_batch(state.subject_id, missing)))
    }
}
