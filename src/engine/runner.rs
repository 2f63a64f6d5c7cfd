//! Engine - spawns node tasks and waits for the run's terminal output.
//!
//! The engine owns a child cancellation token of the caller's token.
//! Whatever way a run ends (output, node failure, cancellation) every
//! node task is cancelled and reaped before the result is returned.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use super::edge::Outbox;
use super::mailbox::{drive, NodeOptions};
use super::node::{Node, NodeContext};
use super::progress::{ProgressEmitter, ProgressSink};
use super::state::RunStateStore;
use crate::error::{OrchestratorError, Result};

/// Executes the node tasks of one run.
pub struct Engine {
    cancel: CancellationToken,
    state: Arc<RunStateStore>,
    progress: Arc<dyn ProgressSink>,
    tasks: JoinSet<Result<()>>,
}

impl Engine {
    pub fn new(
        parent: &CancellationToken,
        state: Arc<RunStateStore>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            cancel: parent.child_token(),
            state,
            progress,
            tasks: JoinSet::new(),
        }
    }

    /// Number of node tasks still tracked.
    pub fn node_count(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn `node` on its own task, reading from `inbox` and routing into `outbox`.
    pub fn spawn<N: Node>(
        &mut self,
        node: N,
        inbox: mpsc::Receiver<N::Input>,
        outbox: Outbox<N::Output>,
        options: NodeOptions,
    ) {
        let id = node.id().clone();
        let ctx = NodeContext::new(
            id.clone(),
            self.cancel.clone(),
            self.state.clone(),
            ProgressEmitter::new(id.clone(), self.progress.clone()),
        );
        let span = tracing::debug_span!("node", id = %id, kind = %node.kind());

        self.tasks
            .spawn(drive(node, inbox, outbox, options, ctx).instrument(span));
    }

    /// Wait for the terminal output, the first fatal node error, or cancellation.
    pub async fn run_until_output<T>(mut self, mut output: oneshot::Receiver<T>) -> Result<T> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.shutdown().await;
                    return Err(OrchestratorError::Cancelled);
                }
                received = &mut output => {
                    return match received {
                        Ok(value) => {
                            self.shutdown().await;
                            Ok(value)
                        }
                        Err(_) => Err(self.shutdown().await.unwrap_or(OrchestratorError::NoOutput)),
                    };
                }
                joined = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match flatten(joined) {
                        Some(err) => {
                            let cancelled = self.cancel.is_cancelled();
                            let err = match self.shutdown().await {
                                _ if cancelled => OrchestratorError::Cancelled,
                                Some(root) if err.is_cancelled() => root,
                                _ => err,
                            };
                            return Err(err);
                        }
                        None => continue,
                    }
                }
            }
        }
    }

    /// Cancel and reap all node tasks. Returns the first non-cancellation error seen.
    async fn shutdown(&mut self) -> Option<OrchestratorError> {
        self.cancel.cancel();
        let mut first = None;

        while let Some(joined) = self.tasks.join_next().await {
            if let Some(err) = flatten(Some(joined)) {
                if first.is_none() && !err.is_cancelled() {
                    first = Some(err);
                }
            }
        }

        debug!("all node tasks stopped");
        first
    }
}

fn flatten(
    joined: Option<std::result::Result<Result<()>, tokio::task::JoinError>>,
) -> Option<OrchestratorError> {
    match joined {
        Some(Ok(Ok(()))) | None => None,
        Some(Ok(Err(err))) => Some(err),
        Some(Err(join_err)) if join_err.is_cancelled() => Some(OrchestratorError::Cancelled),
        Some(Err(join_err)) => Some(OrchestratorError::NodePanicked(join_err.to_string())),
    }
}
