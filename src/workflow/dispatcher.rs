//! Dispatcher - entry node of an analysis run.

use async_trait::async_trait;
use tracing::info;

use crate::engine::{Node, NodeContext, NodeId, NodeKind, Outcome};
use crate::error::{OrchestratorError, Result};
use crate::models::{AnalysisRequest, RunState, TaskMessage};

/// Validates the request, records run state and emits the task to broadcast.
///
/// The expected worker count comes from the workers wired into the graph,
/// not from the request.
pub struct Dispatcher {
    id: NodeId,
    worker_names: Vec<String>,
}

impl Dispatcher {
    pub fn new(worker_names: Vec<String>) -> Result<Self> {
        if worker_names.is_empty() {
            return Err(OrchestratorError::NoWorkersEnabled);
        }

        Ok(Self {
            id: NodeId::from("dispatcher"),
            worker_names,
        })
    }

    pub fn expected_worker_count(&self) -> usize {
        self.worker_names.len()
    }
}

#[async_trait]
impl Node for Dispatcher {
    type Input = AnalysisRequest;
    type Output = TaskMessage;

    fn id(&self) -> &NodeId {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Dispatcher
    }

    fn describe(&self, request: &AnalysisRequest) -> String {
        format!(
            "Dispatching {} to {} workers",
            request.subject_id,
            self.worker_names.len()
        )
    }

    async fn handle(
        &mut self,
        request: AnalysisRequest,
        ctx: &NodeContext,
    ) -> Result<Outcome<TaskMessage>> {
        request.validate()?;

        let state = RunState {
            subject_id: request.subject_id.clone(),
            expected_worker_count: self.expected_worker_count(),
            worker_names: self.worker_names.clone(),
        };
        ctx.state().put_run_state(&state).await?;

        info!(
            "Dispatching {} to workers: {}",
            request.subject_id,
            self.worker_names.join(", ")
        );

        Ok(Outcome::Forward(TaskMessage::from_request(&request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::test_context;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_requires_workers() {
        assert!(matches!(
            Dispatcher::new(Vec::new()),
            Err(OrchestratorError::NoWorkersEnabled)
        ));
    }

    #[tokio::test]
    async fn test_writes_run_state_and_forwards_task() {
        let (ctx, _events) = test_context("dispatcher");
        let mut dispatcher = Dispatcher::new(names(&["Fundamental", "News"])).unwrap();
        assert_eq!(dispatcher.expected_worker_count(), 2);

        let outcome = dispatcher
            .handle(AnalysisRequest::new("AAPL"), &ctx)
            .await
            .unwrap();

        let task = outcome.into_forwarded().unwrap();
        assert_eq!(task.subject_id, "AAPL");

        let state = ctx.state().run_state().await.unwrap();
        assert_eq!(state.expected_worker_count, 2);
        assert_eq!(state.worker_names, names(&["Fundamental", "News"]));
    }

    #[tokio::test]
    async fn test_rejects_empty_subject_without_writing_state() {
        let (ctx, _events) = test_context("dispatcher");
        let mut dispatcher = Dispatcher::new(names(&["News"])).unwrap();

        let err = dispatcher
            .handle(AnalysisRequest::new(""), &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
        assert!(ctx.state().run_state().await.is_err());
    }
}
