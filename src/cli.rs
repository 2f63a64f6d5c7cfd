//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Options left unset fall back to the
//! configuration file, then to built-in defaults.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// analystdesk - multi-analyst research reports from local LLMs
///
/// Sends one subject to a panel of analyst workers in parallel, waits for
/// all of them, and has a lead analyst synthesize a single report.
///
/// Examples:
///   analystdesk --subject AAPL
///   analystdesk --subject NVDA --workers technical,sentiment,risk
///   analystdesk --subject MSFT --format json --output msft.json
///   analystdesk --subject TSLA --deadline 600 --template board.txt
///   analystdesk --list-workers
///   analystdesk --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Identifier of the subject to analyze (e.g. a ticker symbol)
    #[arg(
        short,
        long,
        value_name = "ID",
        required_unless_present_any = ["init_config", "list_workers"]
    )]
    pub subject: Option<String>,

    /// Custom instructions sent to every worker
    ///
    /// Replaces the default task wording.
    #[arg(short, long, value_name = "TEXT")]
    pub instructions: Option<String>,

    /// Worker roles to run (comma-separated)
    ///
    /// Example: --workers fundamental,news,risk. See --list-workers.
    #[arg(short, long, value_name = "ROLES", value_delimiter = ',')]
    pub workers: Option<Vec<String>>,

    /// Ollama model used by the workers
    ///
    /// Can also be set via ANALYSTDESK_MODEL or .analystdesk.toml.
    #[arg(short, long, env = "ANALYSTDESK_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, value_name = "URL", env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .analystdesk.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Synthesis instruction template file
    ///
    /// `{subject}` in the file is replaced by the subject identifier.
    #[arg(short, long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Seconds to wait for workers before synthesizing what has arrived
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Request timeout in seconds for each model call
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not draw progress spinners
    #[arg(long)]
    pub no_progress: bool,

    /// List the available worker roles and exit
    #[arg(long)]
    pub list_workers: bool,

    /// Generate a default .analystdesk.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Nothing else matters for the informational commands
        if self.init_config || self.list_workers {
            return Ok(());
        }

        match self.subject.as_deref().map(str::trim) {
            None | Some("") => return Err("Subject must not be empty".to_string()),
            Some(_) => {}
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.deadline == Some(0) {
            return Err("Deadline must be at least 1 second".to_string());
        }

        if let Some(ref workers) = self.workers {
            if workers.iter().all(|w| w.trim().is_empty()) {
                return Err("--workers needs at least one role".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Worker roles given on the command line, blanks removed.
    pub fn worker_roles(&self) -> Option<Vec<String>> {
        self.workers.as_ref().map(|workers| {
            workers
                .iter()
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            subject: Some("AAPL".to_string()),
            instructions: None,
            workers: None,
            model: None,
            ollama_url: None,
            output: None,
            format: None,
            config: None,
            template: None,
            deadline: None,
            timeout: None,
            temperature: None,
            verbose: false,
            quiet: false,
            no_progress: false,
            list_workers: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "analystdesk",
            "--subject",
            "NVDA",
            "--workers",
            "technical,risk",
            "--format",
            "json",
            "--deadline",
            "90",
        ])
        .unwrap();

        assert_eq!(args.subject.as_deref(), Some("NVDA"));
        assert_eq!(
            args.worker_roles(),
            Some(vec!["technical".to_string(), "risk".to_string()])
        );
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert_eq!(args.deadline, Some(90));
    }

    #[test]
    fn test_subject_required_unless_informational() {
        assert!(Args::try_parse_from(["analystdesk"]).is_err());
        assert!(Args::try_parse_from(["analystdesk", "--list-workers"]).is_ok());
        assert!(Args::try_parse_from(["analystdesk", "--init-config"]).is_ok());
    }

    #[test]
    fn test_validation_blank_subject() {
        let mut args = make_args();
        args.subject = Some("  ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut args = make_args();
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.deadline = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.ollama_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());

        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
