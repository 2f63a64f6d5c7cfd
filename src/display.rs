//! Terminal progress display.
//!
//! One spinner per node, created on the node's first event and finished
//! when the node completes its last invocation or fails.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::engine::progress::FORWARDED;
use crate::engine::{NodeId, ProgressSink};
use crate::models::{ProgressEvent, ProgressPhase};

/// Progress sink drawing node spinners with `indicatif`.
pub struct ProgressDisplay {
    multi: MultiProgress,
    bars: Mutex<HashMap<NodeId, ProgressBar>>,
    style: ProgressStyle,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn with_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix:.bold.cyan} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            style,
        }
    }

    fn bar_for(&self, bars: &mut HashMap<NodeId, ProgressBar>, node: &NodeId) -> ProgressBar {
        bars.entry(node.clone())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(self.style.clone());
                bar.set_prefix(node.to_string());
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            })
            .clone()
    }

    /// Stop every spinner that is still running.
    pub fn finish(&self) {
        let Ok(bars) = self.bars.lock() else {
            return;
        };
        for bar in bars.values().filter(|bar| !bar.is_finished()) {
            bar.abandon();
        }
    }

    /// Number of nodes seen so far.
    #[allow(dead_code)] // Display introspection
    pub fn node_count(&self) -> usize {
        self.bars.lock().map(|bars| bars.len()).unwrap_or(0)
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressDisplay {
    fn emit(&self, event: ProgressEvent) {
        // A poisoned lock only loses the display, never the run.
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        let bar = self.bar_for(&mut bars, &event.node_id);

        match event.phase {
            ProgressPhase::Started => bar.set_message(event.description),
            ProgressPhase::Completed if event.description == FORWARDED => {
                bar.finish_with_message("done")
            }
            ProgressPhase::Completed => bar.set_message(event.description),
            ProgressPhase::Failed => {
                bar.abandon_with_message(format!("failed: {}", event.description))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> ProgressDisplay {
        ProgressDisplay::with_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn test_one_bar_per_node() {
        let display = hidden();
        display.emit(ProgressEvent::new(
            NodeId::from("dispatcher"),
            ProgressPhase::Started,
            "Dispatching AAPL",
        ));
        display.emit(ProgressEvent::new(
            NodeId::from("dispatcher"),
            ProgressPhase::Completed,
            FORWARDED,
        ));
        display.emit(ProgressEvent::new(
            NodeId::from("aggregator"),
            ProgressPhase::Started,
            "Collecting result from News",
        ));

        assert_eq!(display.node_count(), 2);

        let bars = display.bars.lock().unwrap();
        assert!(bars[&NodeId::from("dispatcher")].is_finished());
        assert!(!bars[&NodeId::from("aggregator")].is_finished());
    }

    #[test]
    fn test_finish_stops_running_bars() {
        let display = hidden();
        display.emit(ProgressEvent::new(
            NodeId::from("worker:News"),
            ProgressPhase::Started,
            "News analyzing AAPL",
        ));
        display.finish();

        let bars = display.bars.lock().unwrap();
        assert!(bars.values().all(ProgressBar::is_finished));
    }
}
