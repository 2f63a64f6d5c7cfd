//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.analystdesk.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::LlmConfig;
use crate::cli::{Args, OutputFormat};
use crate::workflow::{RunOptions, SynthesisTemplate, DEFAULT_MAILBOX_CAPACITY};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".analystdesk.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Worker selection.
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Synthesis settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Run execution settings.
    #[serde(default)]
    pub run: RunConfig,
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Draw progress spinners while running.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: OutputFormat::default(),
            verbose: false,
            show_progress: true,
        }
    }
}

fn default_output() -> String {
    "analysis_report.md".to_string()
}

fn default_true() -> bool {
    true
}

/// LLM model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model used by the workers.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout() -> u64 {
    300
}

/// Which roles from the catalog take part in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_workers")]
    pub enabled: Vec<String>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            enabled: default_workers(),
        }
    }
}

fn default_workers() -> Vec<String> {
    vec!["fundamental", "technical", "news"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Synthesis settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Instruction template file. Built-in instruction when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Model for the synthesis call. Falls back to `model.name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Run execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seconds to wait for workers before synthesizing a partial batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_seconds: Option<u64>,

    /// Mailbox capacity per node.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: None,
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.analystdesk.toml` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if args.verbose {
            self.general.verbose = true;
        }
        if args.no_progress || args.quiet {
            self.general.show_progress = false;
        }

        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        if let Some(roles) = args.worker_roles() {
            self.workers.enabled = roles;
        }

        if let Some(ref template) = args.template {
            self.synthesis.template = Some(template.display().to_string());
        }

        if let Some(deadline) = args.deadline {
            self.run.deadline_seconds = Some(deadline);
        }
    }

    /// Connection settings for the worker model.
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            ollama_url: self.model.ollama_url.clone(),
            model_name: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    /// Model used for the synthesis call.
    pub fn synthesis_model(&self) -> &str {
        self.synthesis.model.as_deref().unwrap_or(&self.model.name)
    }

    pub fn synthesis_template(&self) -> SynthesisTemplate {
        match self.synthesis.template.as_deref() {
            Some(path) if !path.trim().is_empty() => SynthesisTemplate::File(PathBuf::from(path)),
            _ => SynthesisTemplate::Builtin,
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            deadline: self.run.deadline_seconds.map(Duration::from_secs),
            mailbox_capacity: self.run.mailbox_capacity,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.general.output)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
