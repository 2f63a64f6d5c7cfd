//! Message router for analysis graphs.
//!
//! Nodes run on their own tasks and exchange typed messages along
//! broadcast, fan-in and terminal edges:
//!
//! - one invocation at a time per node (handlers own their state)
//! - handlers may decline to forward (`Outcome::Wait`)
//! - one terminal output ends the run
//! - any handler error aborts the whole run

pub mod edge;
pub mod gate;
pub mod mailbox;
pub mod node;
pub mod progress;
pub mod runner;
pub mod state;

pub use edge::{Edge, Inbox, Outbox};
pub use gate::ReleaseGate;
pub use mailbox::NodeOptions;
pub use node::{Node, NodeContext, NodeId, NodeKind, Outcome};
pub use progress::{ProgressSink, TracingSink};
pub use runner::Engine;
pub use state::RunStateStore;
