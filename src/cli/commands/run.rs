//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command for the envmatrix CLI, which
//! runs the selected environments of the matrix configuration and reports
//! the outcome.
//!
//! 此模块实现了 envmatrix CLI 的 `run` 命令，
//! 运行矩阵配置中选中的环境并报告结果。

use anyhow::{Context, Result};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::core::config::{ConfigModel, load_config};
use crate::core::engine::{Engine, EngineOptions, RunRequest};
use crate::core::models::Status;
use crate::core::planner::split_selectors;
use crate::infra::command::SystemExecutor;
use crate::infra::fs::absolute_path;
use crate::infra::t;
use crate::reporting::{
    console::{print_failure_details, print_summary},
    html::generate_html_report,
    json::write_json_report,
};

/// Parsed arguments of the `run` command.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub config: PathBuf,
    pub project_dir: PathBuf,
    /// Raw `-e` values; each may hold several comma-separated patterns.
    pub selectors: Vec<String>,
    pub axis: Option<String>,
    pub jobs: Option<usize>,
    pub recreate: bool,
    pub keep_failed: bool,
    /// Raw `--set-env KEY=VALUE` values.
    pub set_env: Vec<String>,
    pub quiet: bool,
    pub html: Option<PathBuf>,
    pub json: Option<PathBuf>,
    pub passthrough: Vec<String>,
    /// Language given on the command line; overrides the config's.
    pub lang: Option<String>,
}

/// Executes the run command with the provided arguments.
///
/// # Returns
/// `Ok(true)` when every selected environment succeeded, `Ok(false)` when the
/// run completed with failures or was cancelled, and `Err` for fatal problems
/// (unreadable config, unmapped axis value, empty selection).
pub async fn execute(args: RunArgs) -> Result<bool> {
    let project_root = absolute_path(&args.project_dir).with_context(|| {
        t!("run.project_dir_not_found", path = args.project_dir.display()).to_string()
    })?;
    let config_path = resolve_config_path(&args.config, &project_root);
    let config = load_config(&config_path).with_context(|| {
        t!("run.config_load_failed", path = config_path.display()).to_string()
    })?;

    let locale = args
        .lang
        .clone()
        .unwrap_or_else(|| config.language().to_string());
    rust_i18n::set_locale(&locale);

    println!(
        "{}",
        t!("run.project_root", locale = locale, path = project_root.display())
    );
    println!(
        "{}",
        t!("run.loading_config", locale = locale, path = config_path.display())
    );

    let axis = resolve_axis(args.axis.clone(), &config);
    if let Some(axis) = &axis {
        println!("{}", t!("run.axis_value", locale = locale, axis = axis).cyan());
    }

    let env_overrides = parse_env_overrides(&args.set_env)?;
    let selectors = parse_selectors(&args.selectors);

    let mut options = EngineOptions::from_config(&config, &project_root)
        .with_recreate(args.recreate)
        .with_keep_failed(args.keep_failed || config.keep_failed())
        .with_live_output(!args.quiet)
        .with_progress(!args.quiet);
    if let Some(jobs) = args.jobs {
        options = options.with_jobs(jobs);
    }
    let jobs = options.jobs;

    let engine = Engine::new(Arc::new(config), Arc::new(SystemExecutor), options);
    let request = RunRequest {
        selectors,
        axis,
        passthrough: args.passthrough,
        env_overrides,
    };

    let plan = engine.plan(&request)?;
    println!(
        "{}",
        t!(
            "run.selected",
            locale = locale,
            count = plan.specs.len(),
            names = plan.names().join(", "),
            jobs = jobs
        )
        .bold()
    );

    let cancel = setup_signal_handler(&locale);
    let summary = engine.run(request, cancel.clone()).await?;

    print_summary(&summary, &locale);
    print_failure_details(&summary, &locale);

    if let Some(report_path) = &args.html {
        println!(
            "\n{}",
            t!("run.html_report", locale = locale, path = report_path.display())
        );
        if let Err(e) = generate_html_report(&summary, report_path, &locale) {
            eprintln!("{} {:#}", t!("run.report_failed", locale = locale).red(), e);
        }
    }
    if let Some(report_path) = &args.json {
        println!(
            "{}",
            t!("run.json_report", locale = locale, path = report_path.display())
        );
        if let Err(e) = write_json_report(&summary, report_path) {
            eprintln!("{} {:#}", t!("run.report_failed", locale = locale).red(), e);
        }
    }

    if summary.overall_success() {
        println!("\n{}", t!("run.all_passed", locale = locale).green().bold());
    } else if cancel.is_cancelled() {
        println!(
            "\n{}",
            t!(
                "run.cancelled",
                locale = locale,
                count = summary.count(Status::Cancelled)
            )
            .yellow()
            .bold()
        );
    } else {
        println!(
            "\n{}",
            t!(
                "run.some_failed",
                locale = locale,
                count = summary.count(Status::Failed)
            )
            .red()
            .bold()
        );
    }

    Ok(summary.overall_success())
}

/// A relative config path is looked up in the project directory.
fn resolve_config_path(config: &Path, project_root: &Path) -> PathBuf {
    if config.is_absolute() {
        config.to_path_buf()
    } else {
        project_root.join(config)
    }
}

/// The `--axis` value, or else the value of the config's CI axis variable.
/// Empty values count as unset.
pub fn resolve_axis(flag: Option<String>, config: &ConfigModel) -> Option<String> {
    flag.or_else(|| {
        config
            .axis_variable()
            .and_then(|var| std::env::var(var).ok())
    })
    .filter(|value| !value.trim().is_empty())
}

/// Splits the raw `-e` values into patterns. No values means "use the envlist".
pub fn parse_selectors(raw: &[String]) -> Option<Vec<String>> {
    let selectors: Vec<String> = raw.iter().flat_map(|r| split_selectors(r)).collect();
    (!selectors.is_empty()).then_some(selectors)
}

/// Parses `KEY=VALUE` pairs. The value may itself contain `=`.
pub fn parse_env_overrides(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .with_context(|| t!("run.invalid_set_env", value = pair).to_string())?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Sets up a signal handler for graceful shutdown.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    token
}
