//! Coordinator - turns the complete batch into the final report.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{Node, NodeContext, NodeId, NodeKind, Outcome};
use crate::error::{OrchestratorError, Result};
use crate::models::{AggregatedBatch, FinalReport};

/// Instruction used when no template is configured or it cannot be read.
pub const DEFAULT_SYNTHESIS_INSTRUCTION: &str = "You are the lead analyst. You receive \
independent reports from specialist analysts about the same subject. Reconcile them into \
one consolidated report: summarize the key findings, call out where the analysts agree \
and disagree, and finish with an overall assessment and its main risks.";

/// Substituted when the synthesis call returns no text.
pub const SYNTHESIS_PLACEHOLDER: &str =
    "Synthesis unavailable: the synthesis model returned an empty response.";

// ============================================================================
// SYNTHESIS CONTEXT
// ============================================================================

/// Who a context entry speaks as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextRole {
    System,
    Worker,
    User,
}

/// One entry of the conversation handed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: ContextRole,
    /// Worker name for worker entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub content: String,
}

impl ContextEntry {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ContextRole::System,
            author: None,
            content: content.into(),
        }
    }

    pub fn worker(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ContextRole::Worker,
            author: Some(author.into()),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ContextRole::User,
            author: None,
            content: content.into(),
        }
    }
}

/// The external synthesis call.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        context: &[ContextEntry],
        cancel: &CancellationToken,
    ) -> anyhow::Result<String>;
}

/// Where the synthesis instruction comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SynthesisTemplate {
    #[default]
    Builtin,
    /// Text file; `{subject}` is replaced by the subject identifier.
    File(PathBuf),
}

impl SynthesisTemplate {
    /// Resolve the instruction for `subject_id`. Never fails.
    pub async fn load(&self, subject_id: &str) -> String {
        let path = match self {
            SynthesisTemplate::Builtin => return DEFAULT_SYNTHESIS_INSTRUCTION.to_string(),
            SynthesisTemplate::File(path) => path,
        };

        match tokio::fs::read_to_string(path).await {
            Ok(text) if !text.trim().is_empty() => text.trim().replace("{subject}", subject_id),
            Ok(_) => {
                warn!(
                    "Synthesis template {} is empty, using built-in instruction",
                    path.display()
                );
                DEFAULT_SYNTHESIS_INSTRUCTION.to_string()
            }
            Err(e) => {
                warn!(
                    "Cannot read synthesis template {}: {}. Using built-in instruction",
                    path.display(),
                    e
                );
                DEFAULT_SYNTHESIS_INSTRUCTION.to_string()
            }
        }
    }
}

/// Build the synthesis conversation: instruction, one entry per worker
/// (sorted by worker name), then the request naming the subject.
pub fn build_context(instruction: &str, batch: &AggregatedBatch) -> Vec<ContextEntry> {
    let mut context = Vec::with_capacity(batch.results.len() + 2);
    context.push(ContextEntry::system(instruction));

    for (name, result) in batch.by_worker() {
        context.push(ContextEntry::worker(name, result.content.render()));
    }

    let mut request = format!(
        "Write the consolidated analysis report for {}.",
        batch.subject_id
    );
    if !batch.is_complete() {
        request.push_str(&format!(
            " These analysts did not report in time: {}. Note the gap.",
            batch.missing.join(", ")
        ));
    }
    context.push(ContextEntry::user(request));
    context
}

// ============================================================================
// NODE
// ============================================================================

pub struct Coordinator {
    id: NodeId,
    synthesizer: Arc<dyn Synthesizer>,
    template: SynthesisTemplate,
}

impl Coordinator {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, template: SynthesisTemplate) -> Self {
        Self {
            id: NodeId::from("coordinator"),
            synthesizer,
            template,
        }
    }
}

#[async_trait]
impl Node for Coordinator {
    type Input = AggregatedBatch;
    type Output = FinalReport;

    fn id(&self) -> &NodeId {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Coordinator
    }

    fn describe(&self, batch: &AggregatedBatch) -> String {
        format!(
            "Synthesizing {} worker results for {}",
            batch.results.len(),
            batch.subject_id
        )
    }

    async fn handle(
        &mut self,
        batch: AggregatedBatch,
        ctx: &NodeContext,
    ) -> Result<Outcome<FinalReport>> {
        let instruction = self.template.load(&batch.subject_id).await;
        let context = build_context(&instruction, &batch);

        let synthesis = self
            .synthesizer
            .synthesize(&context, ctx.cancellation())
            .await
            .map_err(|source| OrchestratorError::SynthesisFailure { source })?;

        let synthesis = if synthesis.trim().is_empty() {
            warn!("Synthesis returned no text for {}", batch.subject_id);
            SYNTHESIS_PLACEHOLDER.to_string()
        } else {
            synthesis
        };

        info!("Report ready for {}", batch.subject_id);

        Ok(Outcome::Forward(FinalReport {
            subject_id: batch.subject_id,
            worker_results: batch.results,
            missing_workers: batch.missing,
            synthesis,
            created_at: Utc::now(),
        }))
    }
}
