//! AnalystDesk - multi-analyst research reports from local LLMs
//!
//! A CLI tool that sends one subject to a panel of analyst workers in
//! parallel, waits for every worker at a barrier, and has a coordinator
//! synthesize a single report with Ollama.
//!
//! Exit codes:
//!   0   - Success
//!   1   - Runtime error (connection, config, worker or synthesis failure)
//!   130 - Interrupted with Ctrl-C

mod agent;
mod cli;
mod config;
mod display;
mod engine;
mod error;
mod models;
mod report;
mod workflow;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use display::ProgressDisplay;
use engine::{ProgressSink, TracingSink};
use error::OrchestratorError;
use models::{AnalysisRequest, RunId};
use report::ReportMetadata;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use workflow::Orchestrator;

const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Informational commands need no logging
    if args.init_config {
        return handle_init_config();
    }
    if args.list_workers {
        handle_list_workers();
        return Ok(());
    }

    // Initialize logging
    init_logging(&args);

    info!("AnalystDesk v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match run(args, cancel).await {
        Ok(()) => Ok(()),
        Err(e) if is_interrupted(&e) => {
            eprintln!("\nInterrupted, no report written.");
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .analystdesk.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize model, workers, deadline, and more.");
    Ok(())
}

/// Handle --list-workers: print the role catalog.
fn handle_list_workers() {
    println!("Available workers:\n");
    for role in agent::WorkerRole::ALL {
        println!("  {:<12} {}", role.key(), role.description());
    }
    println!("\nSelect with --workers or [workers] enabled in {}.", CONFIG_FILE_NAME);
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Cancel the run on the first Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });
}

fn is_interrupted(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<OrchestratorError>()
        .is_some_and(OrchestratorError::is_cancelled)
}

/// Run one analysis and write the report.
async fn run(args: Args, cancel: CancellationToken) -> Result<()> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let subject = args.subject.clone().unwrap_or_default();
    let mut request = AnalysisRequest::new(subject.trim());
    if let Some(ref instructions) = args.instructions {
        request = request.with_instructions(instructions.clone());
    }

    // Build the model clients
    let client = agent::OllamaClient::new(config.llm_config())?;
    let synthesis_client = client.with_model(config.synthesis_model());
    let workers = agent::select_workers(&config.workers.enabled, &client)?;

    if !args.quiet {
        println!("🔬 Analyzing {}", request.subject_id);
        println!("   Model: {}", client.model());
        if synthesis_client.model() != client.model() {
            println!("   Synthesis model: {}", synthesis_client.model());
        }
        println!("   Ollama: {}", client.config().ollama_url);
        println!(
            "   Workers: {}",
            workers
                .iter()
                .map(|w| w.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if let Some(deadline) = config.run.deadline_seconds {
            println!("   Deadline: {}s", deadline);
        }
        println!();
    }

    // Progress goes to spinners when a terminal user is watching, otherwise to the log
    let display = config
        .general
        .show_progress
        .then(|| Arc::new(ProgressDisplay::new()));
    let progress: Arc<dyn ProgressSink> = match display {
        Some(ref display) => display.clone(),
        None => Arc::new(TracingSink),
    };

    let orchestrator = Orchestrator::new(Arc::new(agent::LlmSynthesizer::new(
        synthesis_client.clone(),
    )))
    .with_template(config.synthesis_template())
    .with_options(config.run_options());

    let run_id = RunId::generate();
    let result = orchestrator
        .run_analysis_as(run_id.clone(), request, workers, progress, &cancel)
        .await;

    if let Some(display) = display {
        display.finish();
    }
    let final_report = result?;

    // Render and save the report
    let metadata = ReportMetadata {
        run_id: run_id.to_string(),
        model_used: client.model().to_string(),
        synthesis_model: synthesis_client.model().to_string(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(&final_report, &metadata)?,
        OutputFormat::Markdown => report::generate_markdown_report(&final_report, &metadata),
    };

    let output_path = config.output_path();
    report::save_report(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    if !args.quiet {
        println!("\n📊 Analysis Summary:");
        println!("   Workers reporting: {}", final_report.worker_results.len());
        if !final_report.missing_workers.is_empty() {
            println!(
                "   Workers missing: {}",
                final_report.missing_workers.join(", ")
            );
        }
        println!("   Duration: {:.1}s", metadata.duration_seconds);
        println!(
            "\n✅ Analysis complete! Report saved to: {}",
            output_path.display()
        );
    }

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
