//! Worker node - wraps one externally-backed analysis worker.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{Node, NodeContext, NodeId, NodeKind, Outcome};
use crate::error::{OrchestratorError, Result};
use crate::models::{TaskMessage, WorkerContent, WorkerResult};

/// An analysis worker backed by some external service.
///
/// Implementations are expected to honour `cancel` for long calls.
#[async_trait]
pub trait AnalysisWorker: Send + Sync {
    async fn analyze(
        &self,
        task: &TaskMessage,
        cancel: &CancellationToken,
    ) -> anyhow::Result<WorkerContent>;
}

/// A worker selected for a run.
#[derive(Clone)]
pub struct WorkerDescriptor {
    /// Unique name within a run; becomes `WorkerResult::worker_name`.
    pub name: String,
    pub description: String,
    pub worker: Arc<dyn AnalysisWorker>,
}

impl WorkerDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        worker: Arc<dyn AnalysisWorker>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            worker,
        }
    }
}

impl fmt::Debug for WorkerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Graph node running one worker per task it receives.
pub struct WorkerNode {
    id: NodeId,
    descriptor: WorkerDescriptor,
}

impl WorkerNode {
    pub fn new(descriptor: WorkerDescriptor) -> Self {
        Self {
            id: worker_node_id(&descriptor.name),
            descriptor,
        }
    }
}

/// Node id used for the worker called `name`.
pub fn worker_node_id(name: &str) -> NodeId {
    NodeId::new(format!("worker:{}", name))
}

#[async_trait]
impl Node for WorkerNode {
    type Input = TaskMessage;
    type Output = WorkerResult;

    fn id(&self) -> &NodeId {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Worker
    }

    fn describe(&self, task: &TaskMessage) -> String {
        format!("{} analyzing {}", self.descriptor.name, task.subject_id)
    }

    async fn handle(
        &mut self,
        task: TaskMessage,
        ctx: &NodeContext,
    ) -> Result<Outcome<WorkerResult>> {
        let name = &self.descriptor.name;
        debug!("{} received task for {}", ctx.node_id(), task.subject_id);

        let content = self
            .descriptor
            .worker
            .analyze(&task, ctx.cancellation())
            .await
            .map_err(|source| OrchestratorError::WorkerFailure {
                worker: name.clone(),
                source,
            })?;

        if content.is_empty() {
            warn!("{} returned an empty result", name);
        }

        Ok(Outcome::Forward(WorkerResult {
            worker_name: name.clone(),
            content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{test_context, FailingWorker, StaticWorker};

    fn task() -> TaskMessage {
        TaskMessage {
            subject_id: "AAPL".to_string(),
            instructions: "analyze".to_string(),
        }
    }

    #[tokio::test]
    async fn test_forwards_named_result() {
        let (ctx, _events) = test_context("worker:News");
        let mut node = WorkerNode::new(WorkerDescriptor::new(
            "News",
            "headlines",
            Arc::new(StaticWorker::text("quiet quarter")),
        ));
        assert_eq!(node.id().as_str(), "worker:News");

        let result = node.handle(task(), &ctx).await.unwrap().into_forwarded().unwrap();
        assert_eq!(result, WorkerResult::text("News", "quiet quarter [AAPL]"));
    }

    #[tokio::test]
    async fn test_failure_names_the_worker() {
        let (ctx, _events) = test_context("worker:Risk");
        let mut node = WorkerNode::new(WorkerDescriptor::new(
            "Risk",
            "downside",
            Arc::new(FailingWorker::new("upstream unavailable")),
        ));

        let err = node.handle(task(), &ctx).await.unwrap_err();
        match err {
            OrchestratorError::WorkerFailure { worker, source } => {
                assert_eq!(worker, "Risk");
                assert!(source.to_string().contains("upstream unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_descriptor_debug_hides_worker() {
        let descriptor =
            WorkerDescriptor::new("News", "headlines", Arc::new(StaticWorker::text("x")));
        let rendered = format!("{:?}", descriptor);
        assert!(rendered.contains("News"));
        assert!(rendered.contains(".."));
    }
}
