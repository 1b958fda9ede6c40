//! # HTML Reporting Module / HTML 报告模块
//!
//! This module renders a run summary as a standalone HTML page: totals, a
//! table with one row per environment in spec order, and the captured output
//! of every environment in a collapsible block.
//!
//! 此模块将运行摘要渲染为独立的 HTML 页面：汇总统计、按规格顺序每个环境一行的
//! 表格，以及每个环境捕获输出的可折叠区块。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::Path;

use crate::core::models::{RunSummary, Status};
use crate::infra::t;
use crate::reporting::console::failure_summary;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; margin: 2em; color: #24292f; }
h1 { font-size: 1.6em; }
.summary span { display: inline-block; margin-right: 1.5em; font-weight: 600; }
table { border-collapse: collapse; width: 100%; margin-top: 1em; }
th, td { border: 1px solid #d0d7de; padding: 6px 10px; text-align: left; vertical-align: top; }
th { background: #f6f8fa; }
.status-success { color: #1a7f37; font-weight: 600; }
.status-failed { color: #cf222e; font-weight: 600; }
.status-timeout { color: #9a6700; font-weight: 600; }
.status-cancelled { color: #6e7781; font-weight: 600; }
pre { background: #f6f8fa; padding: 8px; overflow-x: auto; max-height: 30em; }
"#;

/// Renders the report markup for `summary`.
///
/// 为 `summary` 渲染报告标记。
pub fn render_html_report(summary: &RunSummary, locale: &str) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title", locale = locale).to_string()) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.main_header", locale = locale).to_string()) }
                div class="summary" {
                    span { (t!("html_report.summary.total", locale = locale).to_string()) ": " (summary.results().len()) }
                    span class="status-success" { (t!("html_report.summary.passed", locale = locale).to_string()) ": " (summary.count(Status::Success)) }
                    span class="status-failed" { (t!("html_report.summary.failed", locale = locale).to_string()) ": " (summary.count(Status::Failed)) }
                    span class="status-cancelled" { (t!("html_report.summary.cancelled", locale = locale).to_string()) ": " (summary.count(Status::Cancelled)) }
                }
                table {
                    thead {
                        tr {
                            th { (t!("html_report.table.header.name", locale = locale).to_string()) }
                            th { (t!("html_report.table.header.status", locale = locale).to_string()) }
                            th { (t!("html_report.table.header.duration", locale = locale).to_string()) }
                            th { (t!("html_report.table.header.detail", locale = locale).to_string()) }
                            th { (t!("html_report.table.header.output", locale = locale).to_string()) }
                        }
                    }
                    tbody {
                        @for result in summary.results() {
                            tr {
                                td { (result.name) }
                                td class=(result.get_status_class()) { (result.get_status_str(locale)) }
                                td { (format!("{:.2}s", result.duration.as_secs_f64())) }
                                td { (failure_summary(result, locale)) }
                                td {
                                    @if result.output.trim().is_empty() {
                                        (t!("report.no_output", locale = locale).to_string())
                                    } @else {
                                        details {
                                            summary { (t!("html_report.toggle_output", locale = locale).to_string()) }
                                            pre { (result.output) }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Writes the HTML report for `summary` to `output_path`.
///
/// # Errors / 错误
/// Returns an error if the file (or its parent directory) cannot be written.
/// 如果无法写入文件（或其父目录），则返回错误。
pub fn generate_html_report(summary: &RunSummary, output_path: &Path, locale: &str) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let markup = render_html_report(summary, locale);
    fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report to {}", output_path.display()))?;
    Ok(())
}
