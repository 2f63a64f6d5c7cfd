//! LLM-backed collaborators for analysis runs.
//!
//! This module provides the Ollama chat client, the analyst role catalog
//! and the synthesizer used by the coordinator.

pub mod llm;
pub mod roles;
pub mod synthesis;

pub use llm::{LlmConfig, OllamaClient};
pub use roles::{select_workers, WorkerRole};
pub use synthesis::LlmSynthesizer;
