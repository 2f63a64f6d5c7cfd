//! Data models for analysis runs.
//!
//! This module contains the messages that flow between nodes of an
//! analysis graph, the per-run state, and the final report handed back
//! to the caller.

use crate::engine::NodeId;
use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier of one run, used for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        Self(format!("run-{}", uuid::Uuid::new_v4()))
    }

    #[allow(dead_code)] // Display covers logging and reports
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request to analyze one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Identifier of the subject under analysis (e.g. a ticker symbol).
    pub subject_id: String,
    /// Optional instructions replacing the default task wording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

impl AnalysisRequest {
    /// Creates a request with default instructions.
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            custom_instructions: None,
        }
    }

    /// Sets custom instructions for every worker.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    /// Rejects requests that must never start a run.
    pub fn validate(&self) -> Result<()> {
        if self.subject_id.trim().is_empty() {
            return Err(OrchestratorError::invalid_request(
                "subject identifier must not be empty",
            ));
        }
        if self.subject_id.chars().any(char::is_control) {
            return Err(OrchestratorError::invalid_request(
                "subject identifier must not contain control characters",
            ));
        }
        Ok(())
    }
}

/// State shared across node boundaries for one run.
///
/// Written once by the dispatcher, read by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub subject_id: String,
    pub expected_worker_count: usize,
    /// Names of the workers wired into this run, in registration order.
    pub worker_names: Vec<String>,
}

/// The task broadcast identically to every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub subject_id: String,
    pub instructions: String,
}

impl TaskMessage {
    /// Builds the task for a validated request.
    pub fn from_request(request: &AnalysisRequest) -> Self {
        let instructions = match request.custom_instructions.as_deref() {
            Some(custom) if !custom.trim().is_empty() => custom.trim().to_string(),
            _ => default_instructions(&request.subject_id),
        };

        Self {
            subject_id: request.subject_id.clone(),
            instructions,
        }
    }
}

fn default_instructions(subject_id: &str) -> String {
    format!(
        "Produce a concise, evidence-based analysis of {} from your area of expertise. \
         State your key findings, the signals supporting them, and your confidence.",
        subject_id
    )
}

/// Marker that lets held workers start consuming their queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseSignal;

/// Payload produced by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WorkerContent {
    /// Free-form text.
    Text(String),
    /// Structured data (a JSON object).
    Structured(serde_json::Value),
}

impl WorkerContent {
    /// Renders the content as text for prompts and reports.
    pub fn render(&self) -> String {
        match self {
            WorkerContent::Text(text) => text.clone(),
            WorkerContent::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    /// Whether the payload carries no information.
    pub fn is_empty(&self) -> bool {
        match self {
            WorkerContent::Text(text) => text.trim().is_empty(),
            WorkerContent::Structured(value) => value.is_null(),
        }
    }
}

/// One worker's output for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub worker_name: String,
    pub content: WorkerContent,
}

impl WorkerResult {
    #[allow(dead_code)] // Shorthand for plain-text results
    pub fn text(worker_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            worker_name: worker_name.into(),
            content: WorkerContent::Text(text.into()),
        }
    }
}

/// The complete set of worker results, forwarded once by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBatch {
    pub subject_id: String,
    /// Results in arrival order. The order carries no meaning.
    pub results: Vec<WorkerResult>,
    /// Workers that had not reported when a deadline forced the batch out.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl AggregatedBatch {
    /// Results keyed by worker name.
    pub fn by_worker(&self) -> BTreeMap<&str, &WorkerResult> {
        group_by_worker(&self.results)
    }

    /// Whether every expected worker reported.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Group results by worker name, sorted by name.
pub fn group_by_worker(results: &[WorkerResult]) -> BTreeMap<&str, &WorkerResult> {
    results
        .iter()
        .map(|result| (result.worker_name.as_str(), result))
        .collect()
}

/// The consolidated output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub subject_id: String,
    pub worker_results: Vec<WorkerResult>,
    /// Workers absent from a deadline-forced batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_workers: Vec<String>,
    pub synthesis: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle phase of a node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Started,
    Completed,
    Failed,
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressPhase::Started => write!(f, "Started"),
            ProgressPhase::Completed => write!(f, "Completed"),
            ProgressPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Fire-and-forget event describing node progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub node_id: NodeId,
    pub phase: ProgressPhase,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(node_id: NodeId, phase: ProgressPhase, description: impl Into<String>) -> Self {
        Self {
            node_id,
            phase,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_subject() {
        assert!(matches!(
            AnalysisRequest::new("").validate(),
            Err(OrchestratorError::InvalidRequest(_))
        ));
        assert!(AnalysisRequest::new("   ").validate().is_err());
        assert!(AnalysisRequest::new("AA\nPL").validate().is_err());
        assert!(AnalysisRequest::new("AAPL").validate().is_ok());
    }

    #[test]
    fn test_task_uses_custom_instructions() {
        let request = AnalysisRequest::new("MSFT").with_instructions("  Focus on cloud margins ");
        let task = TaskMessage::from_request(&request);
        assert_eq!(task.subject_id, "MSFT");
        assert_eq!(task.instructions, "Focus on cloud margins");

        let default_task = TaskMessage::from_request(&AnalysisRequest::new("MSFT"));
        assert!(default_task.instructions.contains("MSFT"));
    }

    #[test]
    fn test_worker_content_render() {
        let text = WorkerContent::Text("bullish".to_string());
        assert_eq!(text.render(), "bullish");

        let structured = WorkerContent::Structured(serde_json::json!({"rating": "hold"}));
        assert!(structured.render().contains("\"rating\": \"hold\""));
        assert!(!structured.is_empty());
        assert!(WorkerContent::Text("  ".to_string()).is_empty());
    }

    #[test]
    fn test_worker_content_serde_shape() {
        let result = WorkerResult::text("News", "quiet week");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["content"]["kind"], "text");
        assert_eq!(json["content"]["value"], "quiet week");
    }

    #[test]
    fn test_group_by_worker_sorts_by_name() {
        let results = vec![
            WorkerResult::text("Technical", "t"),
            WorkerResult::text("Fundamental", "f"),
            WorkerResult::text("News", "n"),
        ];

        let names: Vec<&str> = group_by_worker(&results).into_keys().collect();
        assert_eq!(names, vec!["Fundamental", "News", "Technical"]);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::generate(), RunId::generate());
        assert!(RunId::generate().as_str().starts_with("run-"));
    }
}
