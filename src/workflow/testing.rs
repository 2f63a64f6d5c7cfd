//! Scripted workers and synthesizers for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::coordinator::{ContextEntry, Synthesizer};
use super::worker::{AnalysisWorker, WorkerDescriptor};
use crate::engine::progress::{ChannelSink, ProgressEmitter};
use crate::engine::{NodeContext, NodeId, RunStateStore};
use crate::models::{ProgressEvent, TaskMessage, WorkerContent};

/// Context for invoking a node handler directly, with a fresh state store.
pub fn test_context(node: &str) -> (NodeContext, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (sink, rx) = ChannelSink::new();
    let id = NodeId::from(node);
    let ctx = NodeContext::new(
        id.clone(),
        CancellationToken::new(),
        Arc::new(RunStateStore::new()),
        ProgressEmitter::new(id, Arc::new(sink)),
    );
    (ctx, rx)
}

/// Answers every task with fixed content, optionally after a delay.
pub struct StaticWorker {
    content: WorkerContent,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticWorker {
    pub fn text(text: &str) -> Self {
        Self {
            content: WorkerContent::Text(text.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisWorker for StaticWorker {
    async fn analyze(
        &self,
        task: &TaskMessage,
        cancel: &CancellationToken,
    ) -> anyhow::Result<WorkerContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("cancelled"),
            _ = tokio::time::sleep(self.delay) => {}
        }

        // Echo the subject so tests can tell runs apart.
        Ok(match &self.content {
            WorkerContent::Text(text) => {
                WorkerContent::Text(format!("{} [{}]", text, task.subject_id))
            }
            other => other.clone(),
        })
    }
}

/// Fails every task.
pub struct FailingWorker {
    message: String,
}

impl FailingWorker {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl AnalysisWorker for FailingWorker {
    async fn analyze(
        &self,
        _task: &TaskMessage,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<WorkerContent> {
        anyhow::bail!("{}", self.message)
    }
}

/// Never answers until the run is cancelled.
pub struct HangingWorker;

#[async_trait]
impl AnalysisWorker for HangingWorker {
    async fn analyze(
        &self,
        _task: &TaskMessage,
        cancel: &CancellationToken,
    ) -> anyhow::Result<WorkerContent> {
        cancel.cancelled().await;
        anyhow::bail!("cancelled while waiting")
    }
}

/// Returns a fixed reply (or error) and records what it was asked.
pub struct ScriptedSynthesizer {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_context: Mutex<Vec<ContextEntry>>,
}

impl ScriptedSynthesizer {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_context: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Vec<ContextEntry> {
        self.last_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(
        &self,
        context: &[ContextEntry],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock().unwrap() = context.to_vec();
        self.reply.clone().map_err(|message| anyhow::anyhow!(message))
    }
}

/// Always returns an empty string.
pub struct EmptySynthesizer;

#[async_trait]
impl Synthesizer for EmptySynthesizer {
    async fn synthesize(
        &self,
        _context: &[ContextEntry],
        _cancel: &CancellationToken,
    ) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// Descriptor for a worker double.
pub fn descriptor(name: &str, worker: Arc<dyn AnalysisWorker>) -> WorkerDescriptor {
    WorkerDescriptor::new(name, format!("{} test worker", name), worker)
}
