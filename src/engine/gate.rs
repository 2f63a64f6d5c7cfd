//! Release gate - deliver-but-hold dispatch.
//!
//! A held node's mailbox accepts messages as usual, but the node does not
//! start draining it until the gate is released. Releasing after a
//! broadcast completes means every recipient has its copy queued before
//! any of them starts work.
//!
//! ```text
//! Dispatcher ──broadcast──▶ [W1 queue] [W2 queue] [W3 queue]   (held)
//!            ──release────▶  W1 ▶      W2 ▶       W3 ▶         (running)
//! ```

use tokio::sync::watch;

use crate::models::ReleaseSignal;

/// Sending half of a release gate. Held by the broadcasting edge.
#[derive(Debug)]
pub struct ReleaseGate {
    tx: watch::Sender<Option<ReleaseSignal>>,
}

/// Receiving half of a release gate. One per held node.
#[derive(Debug, Clone)]
pub struct ReleaseWaiter {
    rx: watch::Receiver<Option<ReleaseSignal>>,
}

impl ReleaseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Create a waiter for a node that must be held until release.
    pub fn waiter(&self) -> ReleaseWaiter {
        ReleaseWaiter {
            rx: self.tx.subscribe(),
        }
    }

    /// Release every waiter. Idempotent.
    pub fn release(&self) {
        self.tx.send_replace(Some(ReleaseSignal));
    }

    #[allow(dead_code)] // State accessor for callers holding the gate
    pub fn is_released(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for ReleaseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseWaiter {
    /// Wait for the release signal.
    ///
    /// Returns `false` if the gate was dropped without being released.
    pub async fn wait(mut self) -> bool {
        self.rx.wait_for(Option::is_some).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_waiter_is_held_until_release() {
        let gate = ReleaseGate::new();
        let mut waiting = task::spawn(gate.waiter().wait());

        assert_pending!(waiting.poll());
        assert!(!gate.is_released());

        gate.release();
        assert!(waiting.is_woken());
        assert_ready_eq!(waiting.poll(), true);
    }

    #[test]
    fn test_waiter_created_after_release_passes_immediately() {
        let gate = ReleaseGate::new();
        gate.release();

        let mut waiting = task::spawn(gate.waiter().wait());
        assert_ready_eq!(waiting.poll(), true);
    }

    #[test]
    fn test_dropped_gate_reports_not_released() {
        let gate = ReleaseGate::new();
        let mut waiting = task::spawn(gate.waiter().wait());
        assert_pending!(waiting.poll());

        drop(gate);
        assert_ready_eq!(waiting.poll(), false);
    }
}
