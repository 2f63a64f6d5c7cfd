//! LLM-backed synthesizer for the coordinator.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::llm::{ChatMessage, OllamaClient};
use crate::workflow::{ContextEntry, ContextRole, Synthesizer};

pub struct LlmSynthesizer {
    client: OllamaClient,
}

impl LlmSynthesizer {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

/// Map synthesis context onto chat messages. Worker entries become user
/// messages prefixed with the worker name.
pub fn to_chat_messages(context: &[ContextEntry]) -> Vec<ChatMessage> {
    context
        .iter()
        .map(|entry| match (entry.role, entry.author.as_deref()) {
            (ContextRole::System, _) => ChatMessage::system(&entry.content),
            (ContextRole::Worker, Some(author)) => {
                ChatMessage::user(format!("[{} analyst]\n{}", author, entry.content))
            }
            (ContextRole::Worker, None) | (ContextRole::User, _) => {
                ChatMessage::user(&entry.content)
            }
        })
        .collect()
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        context: &[ContextEntry],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let messages = to_chat_messages(context);
        debug!(
            "Synthesizing from {} messages with {}",
            messages.len(),
            self.client.model()
        );
        self.client.chat(&messages, cancel).await
    }
}
