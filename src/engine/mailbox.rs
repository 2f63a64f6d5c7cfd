//! Mailbox loop - drives one node inside its own task.
//!
//! The node is owned by the loop and invoked for one message at a time,
//! which is what gives handlers exclusive access to their local state.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::edge::Outbox;
use super::gate::ReleaseWaiter;
use super::node::{Node, NodeContext, Outcome};
use super::progress::{FORWARDED, WAITING};
use crate::error::{OrchestratorError, Result};

/// Per-node scheduling options.
#[derive(Debug, Default)]
pub struct NodeOptions {
    /// Hold the node until the gate is released.
    pub hold: Option<ReleaseWaiter>,
    /// Invoke `on_deadline` once at this instant.
    pub deadline: Option<Instant>,
}

impl NodeOptions {
    pub fn held(waiter: ReleaseWaiter) -> Self {
        Self {
            hold: Some(waiter),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Option<Instant>) -> Self {
        Self {
            hold: None,
            deadline,
        }
    }
}

enum Invocation<T> {
    Message(T),
    Deadline,
}

/// Run `node` until its mailbox closes, the run is cancelled, or a handler fails.
pub(crate) async fn drive<N: Node>(
    mut node: N,
    mut inbox: mpsc::Receiver<N::Input>,
    mut outbox: Outbox<N::Output>,
    options: NodeOptions,
    ctx: NodeContext,
) -> Result<()> {
    let id = node.id().clone();

    if let Some(hold) = options.hold {
        debug!("{} held until release", id);
        let released = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => return Err(OrchestratorError::Cancelled),
            released = hold.wait() => released,
        };
        if !released {
            debug!("{} gate dropped before release, exiting", id);
            return Ok(());
        }
    }

    let deadline = options.deadline;
    let timer = async move {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timer);
    let mut timer_fired = false;

    loop {
        let invocation = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => return Err(OrchestratorError::Cancelled),
            _ = &mut timer, if !timer_fired => {
                timer_fired = true;
                Invocation::Deadline
            }
            next = inbox.recv() => match next {
                Some(input) => Invocation::Message(input),
                None => break,
            },
        };

        let description = match &invocation {
            Invocation::Message(input) => node.describe(input),
            Invocation::Deadline => "deadline reached".to_string(),
        };
        ctx.progress().started(description);

        // Cancellation wins over a handler that fails because of it.
        let result = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => Err(OrchestratorError::Cancelled),
            result = async {
                match invocation {
                    Invocation::Message(input) => node.handle(input, &ctx).await,
                    Invocation::Deadline => node.on_deadline(&ctx).await,
                }
            } => result,
        };

        match result {
            Ok(Outcome::Forward(output)) => {
                ctx.progress().completed(FORWARDED);
                if let Err(err) = outbox.deliver(output, &id).await {
                    ctx.progress().failed(err.to_string());
                    return Err(err);
                }
            }
            Ok(Outcome::Wait) => ctx.progress().completed(WAITING),
            Err(err) => {
                ctx.progress().failed(err.to_string());
                return Err(err);
            }
        }
    }

    debug!("{} mailbox closed", id);
    Ok(())
}
