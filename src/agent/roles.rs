//! The fixed catalog of analyst roles and the LLM-backed worker.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::llm::{ChatMessage, OllamaClient};
use crate::models::{TaskMessage, WorkerContent};
use crate::workflow::{AnalysisWorker, WorkerDescriptor};

/// An analyst role a worker can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Fundamental,
    Technical,
    News,
    Sentiment,
    Risk,
}

impl WorkerRole {
    pub const ALL: [WorkerRole; 5] = [
        WorkerRole::Fundamental,
        WorkerRole::Technical,
        WorkerRole::News,
        WorkerRole::Sentiment,
        WorkerRole::Risk,
    ];

    /// Name used in configuration and on the command line.
    pub fn key(&self) -> &'static str {
        match self {
            WorkerRole::Fundamental => "fundamental",
            WorkerRole::Technical => "technical",
            WorkerRole::News => "news",
            WorkerRole::Sentiment => "sentiment",
            WorkerRole::Risk => "risk",
        }
    }

    /// Name shown in reports and used as the worker name.
    pub fn display_name(&self) -> &'static str {
        match self {
            WorkerRole::Fundamental => "Fundamental",
            WorkerRole::Technical => "Technical",
            WorkerRole::News => "News",
            WorkerRole::Sentiment => "Sentiment",
            WorkerRole::Risk => "Risk",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WorkerRole::Fundamental => "Financial statements, valuation and business quality",
            WorkerRole::Technical => "Price action, trend and momentum indicators",
            WorkerRole::News => "Recent headlines, events and catalysts",
            WorkerRole::Sentiment => "Market, analyst and retail sentiment",
            WorkerRole::Risk => "Downside scenarios, volatility and exposures",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            WorkerRole::Fundamental => FUNDAMENTAL_PROMPT,
            WorkerRole::Technical => TECHNICAL_PROMPT,
            WorkerRole::News => NEWS_PROMPT,
            WorkerRole::Sentiment => SENTIMENT_PROMPT,
            WorkerRole::Risk => RISK_PROMPT,
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for WorkerRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        match WorkerRole::ALL.iter().find(|role| role.key() == wanted) {
            Some(role) => Ok(*role),
            None => bail!(
                "Unknown worker '{}'. Available: {}",
                s.trim(),
                WorkerRole::ALL
                    .iter()
                    .map(WorkerRole::key)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// A worker answering tasks with one chat call in its role.
pub struct LlmWorker {
    role: WorkerRole,
    client: OllamaClient,
}

impl LlmWorker {
    pub fn new(role: WorkerRole, client: OllamaClient) -> Self {
        Self { role, client }
    }

    fn messages(&self, task: &TaskMessage) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.role.prompt()),
            ChatMessage::user(format!(
                "Subject: {}\n\n{}\n\n{}",
                task.subject_id, task.instructions, REPLY_FORMAT
            )),
        ]
    }
}

#[async_trait]
impl AnalysisWorker for LlmWorker {
    async fn analyze(
        &self,
        task: &TaskMessage,
        cancel: &CancellationToken,
    ) -> Result<WorkerContent> {
        debug!(
            "{} analyst querying {}",
            self.role.display_name(),
            self.client.model()
        );
        let reply = self.client.chat(&self.messages(task), cancel).await?;
        Ok(parse_reply(&reply))
    }
}

/// A reply that is a JSON object (optionally fenced) becomes structured
/// content, anything else is kept as text.
pub fn parse_reply(reply: &str) -> WorkerContent {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) if value.is_object() => WorkerContent::Structured(value),
        _ => WorkerContent::Text(trimmed.to_string()),
    }
}

/// Turn configured role names into worker descriptors.
///
/// Order is preserved and repeated roles are collapsed.
pub fn select_workers(enabled: &[String], client: &OllamaClient) -> Result<Vec<WorkerDescriptor>> {
    let mut roles: Vec<WorkerRole> = Vec::new();
    for name in enabled {
        let role: WorkerRole = name.parse()?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    Ok(roles
        .into_iter()
        .map(|role| {
            WorkerDescriptor::new(
                role.display_name(),
                role.description(),
                Arc::new(LlmWorker::new(role, client.clone())),
            )
        })
        .collect())
}

const REPLY_FORMAT: &str = "Reply with either plain prose or a single JSON object with the \
keys \"summary\", \"signals\" (array of strings), \"outlook\" and \"confidence\" (low, medium \
or high). Do not add anything outside the JSON object if you choose JSON.";

const FUNDAMENTAL_PROMPT: &str = r#"You are a fundamental equity analyst.
Assess revenue and earnings trends, margins, balance sheet strength, cash flow and valuation
relative to peers. Be specific about which figures drive your view and flag any data you
are unsure about."#;

const TECHNICAL_PROMPT: &str = r#"You are a technical analyst.
Assess trend direction, support and resistance levels, momentum (RSI, MACD) and volume.
Describe the current setup and the levels that would confirm or invalidate it."#;

const NEWS_PROMPT: &str = r#"You are a news analyst.
Summarize the most relevant recent events, announcements and upcoming catalysts for the
subject, and explain how each is likely to affect it."#;

const SENTIMENT_PROMPT: &str = r#"You are a market sentiment analyst.
Assess how investors, analysts and the public currently view the subject, where that view
is shifting, and whether positioning looks crowded."#;

const RISK_PROMPT: &str = r#"You are a risk analyst.
Identify the main downside scenarios, their likelihood and impact, volatility and any
concentration, regulatory or liquidity exposures."#;
