//! Markdown and JSON report generation.
//!
//! This module renders a [`FinalReport`] for humans (Markdown) or for
//! other tools (JSON).

use crate::models::{group_by_worker, FinalReport, WorkerContent};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Facts about the run that are not part of the report itself.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub run_id: String,
    pub model_used: String,
    pub synthesis_model: String,
    pub duration_seconds: f64,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &FinalReport, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Analysis Report: {}\n\n", report.subject_id));

    output.push_str(&generate_metadata_section(report, metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_synthesis_section(&report.synthesis));
    output.push_str(&generate_findings_section(report));
    output.push_str(&generate_missing_section(&report.missing_workers));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &FinalReport, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Subject:** {}\n", report.subject_id));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Run:** `{}`\n", metadata.run_id));
    section.push_str(&format!("- **Worker Model:** `{}`\n", metadata.model_used));
    if metadata.synthesis_model != metadata.model_used {
        section.push_str(&format!(
            "- **Synthesis Model:** `{}`\n",
            metadata.synthesis_model
        ));
    }
    section.push_str(&format!(
        "- **Workers Reporting:** {}\n",
        report.worker_results.len()
    ));
    if !report.missing_workers.is_empty() {
        section.push_str(&format!(
            "- **Workers Missing:** {}\n",
            report.missing_workers.len()
        ));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &FinalReport) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Synthesis](#synthesis)\n");
    toc.push_str("- [Findings by Worker](#findings-by-worker)\n");

    for name in group_by_worker(&report.worker_results).keys() {
        toc.push_str(&format!("  - [{}](#{})\n", name, anchor(name)));
    }

    if !report.missing_workers.is_empty() {
        toc.push_str("- [Missing Workers](#missing-workers)\n");
    }

    toc.push('\n');

    toc
}

fn generate_synthesis_section(synthesis: &str) -> String {
    format!("## Synthesis\n\n{}\n\n", synthesis.trim())
}

/// Generate one subsection per worker, sorted by worker name.
fn generate_findings_section(report: &FinalReport) -> String {
    let mut section = String::new();

    section.push_str("## Findings by Worker\n\n");

    for (name, result) in group_by_worker(&report.worker_results) {
        section.push_str(&format!("### {} {{#{}}}\n\n", name, anchor(name)));
        section.push_str(&render_content(&result.content));
        section.push_str("\n\n---\n\n");
    }

    section
}

/// Render worker content. Top-level fields of structured content become a list.
fn render_content(content: &WorkerContent) -> String {
    match content {
        WorkerContent::Text(text) if text.trim().is_empty() => "*No findings reported.*".to_string(),
        WorkerContent::Text(text) => text.trim().to_string(),
        WorkerContent::Structured(Value::Object(fields)) => fields
            .iter()
            .map(|(key, value)| format!("- **{}:** {}", key, render_value(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        WorkerContent::Structured(other) => format!("```json\n{}\n```", content_json(other)),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn content_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn generate_missing_section(missing: &[String]) -> String {
    if missing.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Missing Workers\n\n");
    section.push_str("These workers did not report before the run deadline:\n\n");
    for name in missing {
        section.push_str(&format!("- {}\n", name));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by analystdesk*\n".to_string()
}

fn anchor(name: &str) -> String {
    name.replace(['/', '.', ' '], "-").to_lowercase()
}

#[derive(Serialize)]
struct JsonReport<'a> {
    metadata: &'a ReportMetadata,
    #[serde(flatten)]
    report: &'a FinalReport,
}

/// Generate a JSON report.
pub fn generate_json_report(report: &FinalReport, metadata: &ReportMetadata) -> Result<String> {
    serde_json::to_string_pretty(&JsonReport { metadata, report }).map_err(Into::into)
}

/// Write rendered report content to `path`, creating parent directories.
pub fn save_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
