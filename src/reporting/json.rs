//! JSON summary output, for CI systems that post-process results.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::core::models::{RunSummary, Status};

#[derive(Serialize)]
struct JsonReport<'a> {
    total: usize,
    passed: usize,
    failed: usize,
    cancelled: usize,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// Serializes `summary` (results in spec order, `overall_success` and totals)
/// to a JSON string.
pub fn render_json_report(summary: &RunSummary) -> Result<String> {
    let report = JsonReport {
        total: summary.results().len(),
        passed: summary.count(Status::Success),
        failed: summary.count(Status::Failed),
        cancelled: summary.count(Status::Cancelled),
        summary,
    };
    serde_json::to_string_pretty(&report).context("Failed to serialize run summary")
}

/// Writes the JSON summary to `output_path`.
pub fn write_json_report(summary: &RunSummary, output_path: &Path) -> Result<()> {
    let json = render_json_report(summary)?;
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))
}
