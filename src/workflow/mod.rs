//! Fan-out/fan-in analysis workflow.
//!
//! [`Orchestrator::run_analysis`] validates a request, builds a fresh
//! [`AnalysisGraph`] from the selected workers and runs it to completion.

pub mod aggregator;
pub mod builder;
pub mod coordinator;
pub mod dispatcher;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::AnalysisGraph;
pub use coordinator::{ContextEntry, ContextRole, SynthesisTemplate, Synthesizer};
pub use worker::{AnalysisWorker, WorkerDescriptor};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::engine::ProgressSink;
use crate::error::Result;
use crate::models::{AnalysisRequest, FinalReport, RunId};

/// Default mailbox capacity per node.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 16;

/// Per-run execution options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Force the aggregator to forward whatever it has after this long.
    pub deadline: Option<Duration>,
    pub mailbox_capacity: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            deadline: None,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Entry point for analysis runs.
///
/// One orchestrator can serve any number of concurrent runs; every run
/// gets its own graph, state store and aggregator.
pub struct Orchestrator {
    synthesizer: Arc<dyn Synthesizer>,
    template: SynthesisTemplate,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            synthesizer,
            template: SynthesisTemplate::Builtin,
            options: RunOptions::default(),
        }
    }

    pub fn with_template(mut self, template: SynthesisTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Analyze one subject with the given workers.
    ///
    /// Request and worker set are validated before anything is spawned.
    /// After that any node failure aborts the run and no partial report
    /// is returned.
    #[allow(dead_code)] // Library entry point; the CLI passes its own run id
    pub async fn run_analysis(
        &self,
        request: AnalysisRequest,
        workers: Vec<WorkerDescriptor>,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<FinalReport> {
        self.run_analysis_as(RunId::generate(), request, workers, progress, cancel)
            .await
    }

    /// Same as [`run_analysis`](Self::run_analysis) with a caller-chosen run id,
    /// so the caller can quote it in its own output.
    pub async fn run_analysis_as(
        &self,
        run_id: RunId,
        request: AnalysisRequest,
        workers: Vec<WorkerDescriptor>,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<FinalReport> {
        request.validate()?;

        let graph = AnalysisGraph::build(
            workers,
            self.synthesizer.clone(),
            self.template.clone(),
            self.options.clone(),
        )?;

        let span = info_span!("analysis_run", run_id = %run_id, subject = %request.subject_id);

        async move {
            let start = Instant::now();
            info!(
                "Starting analysis with workers: {}",
                graph.worker_names().join(", ")
            );

            let result = graph.execute(request, progress, cancel).await;
            match &result {
                Ok(report) => info!(
                    "Analysis complete in {:.1}s ({} worker results)",
                    start.elapsed().as_secs_f64(),
                    report.worker_results.len()
                ),
                Err(e) => warn!("Analysis failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{
        descriptor, EmptySynthesizer, FailingWorker, HangingWorker, ScriptedSynthesizer,
        StaticWorker,
    };
    use super::*;
    use super::coordinator::SYNTHESIS_PLACEHOLDER;
    use crate::engine::progress::ChannelSink;
    use crate::error::OrchestratorError;
    use crate::models::{ProgressEvent, ProgressPhase, WorkerContent};
    use tokio::sync::mpsc;

    fn quiet() -> Arc<dyn ProgressSink> {
        Arc::new(|_event: ProgressEvent| {})
    }

    fn static_workers(names: &[&str]) -> Vec<WorkerDescriptor> {
        names
            .iter()
            .map(|name| descriptor(name, Arc::new(StaticWorker::text(&format!("{} view", name)))))
            .collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_full_run_produces_report() {
        let synthesizer = Arc::new(ScriptedSynthesizer::new("Consolidated view."));
        let orchestrator = Orchestrator::new(synthesizer.clone());
        let (sink, mut events) = ChannelSink::new();

        let report = orchestrator
            .run_analysis(
                AnalysisRequest::new("AAPL"),
                static_workers(&["Fundamental", "Technical", "News"]),
                Arc::new(sink),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.subject_id, "AAPL");
        assert_eq!(report.synthesis, "Consolidated view.");
        assert_eq!(report.worker_results.len(), 3);
        assert!(report.missing_workers.is_empty());
        assert_eq!(synthesizer.calls(), 1);

        let events = drain(&mut events);
        for node in [
            "dispatcher",
            "worker:Fundamental",
            "worker:Technical",
            "worker:News",
            "aggregator",
            "coordinator",
        ] {
            for phase in [ProgressPhase::Started, ProgressPhase::Completed] {
                assert!(
                    events
                        .iter()
                        .any(|e| e.node_id.as_str() == node && e.phase == phase),
                    "missing {} event for {}",
                    phase,
                    node
                );
            }
        }
        let aggregator_starts = events
            .iter()
            .filter(|e| e.node_id.as_str() == "aggregator" && e.phase == ProgressPhase::Started)
            .count();
        assert_eq!(aggregator_starts, 3);
    }

    #[tokio::test]
    async fn test_every_worker_runs_once() {
        let workers: Vec<Arc<StaticWorker>> = (0..4)
            .map(|_| Arc::new(StaticWorker::text("x")))
            .collect();
        let descriptors = workers
            .iter()
            .enumerate()
            .map(|(i, w)| descriptor(&format!("w{}", i), w.clone()))
            .collect();

        let report = Orchestrator::new(Arc::new(ScriptedSynthesizer::new("ok")))
            .run_analysis(
                AnalysisRequest::new("MSFT"),
                descriptors,
                quiet(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.worker_results.len(), 4);
        assert!(workers.iter().all(|w| w.calls() == 1));
    }

    #[tokio::test]
    async fn test_worker_failure_aborts_before_synthesis() {
        let synthesizer = Arc::new(ScriptedSynthesizer::new("unused"));
        let workers = vec![
            descriptor(
                "Fundamental",
                Arc::new(StaticWorker::text("fine").with_delay(Duration::from_millis(50))),
            ),
            descriptor("News", Arc::new(FailingWorker::new("feed offline"))),
        ];

        let err = Orchestrator::new(synthesizer.clone())
            .run_analysis(
                AnalysisRequest::new("AAPL"),
                workers,
                quiet(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::WorkerFailure { ref worker, .. } if worker == "News"));
        assert_eq!(synthesizer.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_synthesis_still_completes() {
        let report = Orchestrator::new(Arc::new(EmptySynthesizer))
            .run_analysis(
                AnalysisRequest::new("AAPL"),
                static_workers(&["Fundamental", "Technical"]),
                quiet(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.synthesis, SYNTHESIS_PLACEHOLDER);
        assert_eq!(report.worker_results.len(), 2);
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_fatal() {
        let err = Orchestrator::new(Arc::new(ScriptedSynthesizer::failing("model crashed")))
            .run_analysis(
                AnalysisRequest::new("AAPL"),
                static_workers(&["News"]),
                quiet(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::SynthesisFailure { .. }));
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_broadcast() {
        let worker = Arc::new(StaticWorker::text("x"));
        let (sink, mut events) = ChannelSink::new();

        let err = Orchestrator::new(Arc::new(ScriptedSynthesizer::new("ok")))
            .run_analysis(
                AnalysisRequest::new(""),
                vec![descriptor("News", worker.clone())],
                Arc::new(sink),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
        assert_eq!(worker.calls(), 0);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_duplicate_worker_sets_are_rejected() {
        let orchestrator = Orchestrator::new(Arc::new(ScriptedSynthesizer::new("ok")));
        let cancel = CancellationToken::new();

        let err = orchestrator
            .run_analysis(AnalysisRequest::new("AAPL"), Vec::new(), quiet(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoWorkersEnabled));

        let err = orchestrator
            .run_analysis(
                AnalysisRequest::new("AAPL"),
                static_workers(&["News", "News"]),
                quiet(),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateWorker(_)));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let orchestrator = Orchestrator::new(Arc::new(ScriptedSynthesizer::new("ok")));
        let cancel = CancellationToken::new();
        let names = ["Fundamental", "Technical", "News"];

        let (aapl, tsla) = tokio::join!(
            orchestrator.run_analysis(
                AnalysisRequest::new("AAPL"),
                static_workers(&names),
                quiet(),
                &cancel
            ),
            orchestrator.run_analysis(
                AnalysisRequest::new("TSLA"),
                static_workers(&names),
                quiet(),
                &cancel
            ),
        );
        let (aapl, tsla) = (aapl.unwrap(), tsla.unwrap());

        assert_eq!(aapl.worker_results.len(), 3);
        assert_eq!(tsla.worker_results.len(), 3);
        for result in &aapl.worker_results {
            assert!(result.content.render().contains("[AAPL]"));
        }
        for result in &tsla.worker_results {
            assert!(result.content.render().contains("[TSLA]"));
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_hung_run() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = Orchestrator::new(Arc::new(ScriptedSynthesizer::new("ok")))
            .run_analysis(
                AnalysisRequest::new("AAPL"),
                vec![descriptor("Slow", Arc::new(HangingWorker))],
                quiet(),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_forwards_partial_report() {
        let options = RunOptions {
            deadline: Some(Duration::from_millis(100)),
            ..RunOptions::default()
        };
        let mut workers = static_workers(&["Fundamental"]);
        workers.push(descriptor("Slow", Arc::new(HangingWorker)));

        let report = Orchestrator::new(Arc::new(ScriptedSynthesizer::new("partial")))
            .with_options(options)
            .run_analysis(
                AnalysisRequest::new("AAPL"),
                workers,
                quiet(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.worker_results.len(), 1);
        assert_eq!(report.missing_workers, vec!["Slow"]);
    }

    #[tokio::test]
    async fn test_deadline_without_results_fails() {
        let options = RunOptions {
            deadline: Some(Duration::from_millis(50)),
            ..RunOptions::default()
        };

        let err = Orchestrator::new(Arc::new(ScriptedSynthesizer::new("unused")))
            .with_options(options)
            .run_analysis(
                AnalysisRequest::new("AAPL"),
                vec![descriptor("Slow", Arc::new(HangingWorker))],
                quiet(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::DeadlineExceeded {
                received: 0,
                expected: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_structured_content_reaches_report() {
        struct JsonWorker;

        #[async_trait::async_trait]
        impl AnalysisWorker for JsonWorker {
            async fn analyze(
                &self,
                _task: &crate::models::TaskMessage,
                _cancel: &CancellationToken,
            ) -> anyhow::Result<WorkerContent> {
                Ok(WorkerContent::Structured(serde_json::json!({"rsi": 71})))
            }
        }

        let report = Orchestrator::new(Arc::new(ScriptedSynthesizer::new("ok")))
            .run_analysis(
                AnalysisRequest::new("NVDA"),
                vec![descriptor("Technical", Arc::new(JsonWorker))],
                quiet(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            report.worker_results[0].content,
            WorkerContent::Structured(serde_json::json!({"rsi": 71}))
        );
    }
}
