//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints run summaries to the console: a colored table with one
//! row per selected environment in spec order, failure details with the
//! captured output, and live output lines prefixed with their environment.
//!
//! 此模块在控制台打印运行摘要：按规格顺序为每个选中的环境打印一行的彩色表格、
//! 包含捕获输出的失败详情，以及带环境名前缀的实时输出行。

use colored::*;

use crate::core::models::{ExecutionResult, FailureDetail, RunSummary, Status};
use crate::infra::command::display_argv;
use crate::infra::t;

/// Prints a formatted summary of a run to the console.
/// Every selected environment appears exactly once, in spec order.
///
/// 在控制台打印格式化的运行摘要。
/// 每个选中的环境按规格顺序恰好出现一次。
///
/// # Output Format / 输出格式
/// ```text
/// --- Run Summary ---
///   - Status           | Environment                     |   Duration | Detail
///   - Passed           | py38                            |      1.23s |
///   - Failed           | py39                            |      0.45s | pytest -q (exit code 1)
///   - Cancelled        | lint                            |      0.01s |
/// ```
pub fn print_summary(summary: &RunSummary, locale: &str) {
    println!("\n{}", t!("report.summary_banner", locale = locale).bold());

    for result in summary.results() {
        let status_str = result.get_status_str(locale);
        let status_colored = match result.status {
            Status::Success => status_str.green(),
            Status::Failed => status_str.red(),
            Status::Cancelled => status_str.yellow(),
        };

        println!(
            "  - {:<18} | {:<32} | {:>9.2}s | {}",
            status_colored,
            result.name,
            result.duration.as_secs_f64(),
            failure_summary(result, locale).dimmed()
        );
    }

    println!(
        "\n{}",
        t!(
            "report.totals",
            locale = locale,
            total = summary.results().len(),
            passed = summary.count(Status::Success),
            failed = summary.count(Status::Failed),
            cancelled = summary.count(Status::Cancelled)
        )
    );
}

/// One-line description of why an environment did not succeed.
/// Empty for successful environments.
pub fn failure_summary(result: &ExecutionResult, locale: &str) -> String {
    match &result.failure {
        None => String::new(),
        Some(FailureDetail::Command {
            argv, exit_code, ..
        }) => t!(
            "report.detail_command",
            locale = locale,
            command = display_argv(argv),
            code = exit_code.map_or_else(|| "-".to_string(), |c| c.to_string())
        )
        .to_string(),
        Some(FailureDetail::Timeout {
            argv, timeout_secs, ..
        }) => t!(
            "report.detail_timeout",
            locale = locale,
            command = display_argv(argv),
            timeout = timeout_secs
        )
        .to_string(),
        Some(FailureDetail::Spawn { argv, message, .. }) => t!(
            "report.detail_spawn",
            locale = locale,
            command = display_argv(argv),
            error = message
        )
        .to_string(),
        Some(FailureDetail::Provision { message }) => t!(
            "report.detail_provision",
            locale = locale,
            error = message
        )
        .to_string(),
        Some(FailureDetail::Internal { message }) => message.clone(),
    }
}

/// Prints the captured output of every failed environment.
///
/// 打印每个失败环境捕获的输出。
pub fn print_failure_details(summary: &RunSummary, locale: &str) {
    let failures: Vec<&ExecutionResult> = summary.failures().collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("report.failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, result) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}': {}",
            i + 1,
            failures.len(),
            t!("report.failure_header", locale = locale).red(),
            result.name.cyan(),
            failure_summary(result, locale)
        );

        println!("\n--- {} ---\n", t!("report.output_log", locale = locale).yellow());
        if result.output.trim().is_empty() {
            println!("{}", t!("report.no_output", locale = locale).dimmed());
        } else {
            println!("{}", result.output.trim_end());
        }
        println!("\n{}", "-".repeat(80));
    }
}

/// Prints one line of live output prefixed with its environment name.
pub fn print_live_line(env: &str, line: &str) {
    println!("{} {}", format!("[{env}]").blue(), line);
}
