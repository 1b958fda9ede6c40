//! # Engine Module / 引擎模块
//!
//! The programmatic entry point: plans a run, then drives every selected
//! environment through provisioning and command execution on a bounded pool
//! of tokio tasks, and collects the results in spec order.
//!
//! 编程入口：规划一次运行，然后在有界的 tokio 任务池上驱动每个选中的环境完成
//! 环境准备和命令执行，并按规格顺序收集结果。

use chrono::Utc;
use colored::*;
use futures::StreamExt;
use futures::stream;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::aggregator::ResultAggregator;
use crate::core::config::ConfigModel;
use crate::core::error::{ProvisionError, RunError};
use crate::core::execution::CommandRunner;
use crate::core::models::{EnvironmentSpec, ExecutionResult, FailureDetail, RunSummary};
use crate::core::planner::{ExecutionPlan, plan_execution};
use crate::core::provision::{Context, EnvironmentProvisioner, ProvisionPolicy};
use crate::infra::command::{LiveSink, ProcessExecutor};
use crate::infra::fs::copy_dir_all;
use crate::infra::t;

/// Knobs for one engine, usually derived from the config and CLI flags.
/// 单个引擎的配置项，通常来自配置文件和命令行参数。
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub project_root: PathBuf,
    pub work_dir: PathBuf,
    pub jobs: usize,
    pub cache: bool,
    pub recreate: bool,
    pub keep_failed: bool,
    /// Forward subprocess output to the console while it is produced.
    pub live_output: bool,
    /// Print a colored line when an environment starts and ends.
    pub progress: bool,
}

impl EngineOptions {
    /// Options taken from the config file, rooted at `project_root`.
    pub fn from_config(config: &ConfigModel, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            work_dir: project_root.join(config.work_dir()),
            project_root,
            jobs: config.jobs().unwrap_or_else(num_cpus::get),
            cache: config.cache(),
            recreate: false,
            keep_failed: config.keep_failed(),
            live_output: false,
            progress: false,
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_recreate(mut self, recreate: bool) -> Self {
        self.recreate = recreate;
        self
    }

    pub fn with_keep_failed(mut self, keep_failed: bool) -> Self {
        self.keep_failed = keep_failed;
        self
    }

    pub fn with_live_output(mut self, live_output: bool) -> Self {
        self.live_output = live_output;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

/// What to run.
/// 要运行的内容。
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Selector patterns; `None` selects the envlist.
    pub selectors: Option<Vec<String>>,
    /// CI axis value narrowing the selection.
    pub axis: Option<String>,
    /// Extra arguments appended to each environment's final command.
    pub passthrough: Vec<String>,
    /// Variables set for every command, overriding the context's.
    pub env_overrides: BTreeMap<String, String>,
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectors = Some(selectors.into_iter().map(Into::into).collect());
        self
    }

    pub fn axis(mut self, axis: impl Into<String>) -> Self {
        self.axis = Some(axis.into());
        self
    }

    pub fn passthrough<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }
}

/// State shared by every environment task of one run.
struct RunShared {
    provisioner: EnvironmentProvisioner,
    runner: CommandRunner,
    passthrough: Vec<String>,
    overrides: BTreeMap<String, String>,
    work_dir: PathBuf,
    keep_failed: bool,
    progress: bool,
}

/// Orchestrates whole runs over one immutable configuration.
/// 基于一个不可变配置编排完整的运行。
pub struct Engine {
    config: Arc<ConfigModel>,
    executor: Arc<dyn ProcessExecutor>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        config: Arc<ConfigModel>,
        executor: Arc<dyn ProcessExecutor>,
        options: EngineOptions,
    ) -> Self {
        Self {
            config,
            executor,
            options,
        }
    }

    pub fn config(&self) -> &ConfigModel {
        &self.config
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Resolves which environments a request would run, without side effects.
    pub fn plan(&self, request: &RunRequest) -> Result<ExecutionPlan, RunError> {
        plan_execution(
            &self.config,
            request.selectors.as_deref(),
            request.axis.as_deref(),
        )
    }

    /// Runs the selected environments and returns their summary in spec order.
    ///
    /// Selection problems are returned as errors before anything is created or
    /// executed. Failures of individual environments end up in the summary.
    /// When `cancel` fires, running subprocesses are killed and every
    /// environment that did not finish is recorded as `Cancelled`.
    ///
    /// 运行选中的环境，并按规格顺序返回摘要。
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let plan = self.plan(&request)?;
        let aggregator = ResultAggregator::new(plan.names())?;

        std::fs::create_dir_all(&self.options.work_dir).map_err(|source| RunError::Io {
            path: self.options.work_dir.clone(),
            source,
        })?;

        tracing::info!(
            envs = ?plan.names(),
            axis = ?plan.axis,
            jobs = self.options.jobs,
            "starting run"
        );

        let printer = if self.options.live_output {
            aggregator.spawn_live_printer()
        } else {
            None
        };

        let policy = ProvisionPolicy {
            cache: self.options.cache,
            recreate: self.options.recreate,
        };
        let shared = Arc::new(RunShared {
            provisioner: EnvironmentProvisioner::new(
                &self.options.project_root,
                &self.options.work_dir,
                Arc::clone(&self.executor),
                policy,
            ),
            runner: CommandRunner::new(&self.options.project_root, Arc::clone(&self.executor))
                .with_progress(self.options.progress),
            passthrough: request.passthrough,
            overrides: request.env_overrides,
            work_dir: self.options.work_dir.clone(),
            keep_failed: self.options.keep_failed,
            progress: self.options.progress,
        });

        let live_output = self.options.live_output;
        let tasks = plan.specs.into_iter().map(|spec| {
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            let sink = live_output.then(|| aggregator.live_sink(spec.name()));
            let name = spec.name().to_string();

            async move {
                let handle = tokio::spawn(run_environment(shared, spec, sink, cancel));
                match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(env = %name, error = %e, "environment task failed");
                        let failure = FailureDetail::Internal {
                            message: e.to_string(),
                        };
                        ExecutionResult::failed(name, failure, String::new(), Duration::ZERO, Utc::now())
                    }
                }
            }
        });

        let mut results = stream::iter(tasks).buffer_unordered(self.options.jobs.max(1));
        while let Some(result) = results.next().await {
            aggregator.record(result)?;
        }
        drop(results);

        let summary = aggregator.finish()?;

        // The printer stops once the last sender is gone.
        drop(aggregator);
        drop(shared);
        if let Some(printer) = printer {
            let _ = printer.await;
        }

        tracing::info!(
            overall_success = summary.overall_success(),
            duration = ?summary.total_duration(),
            "run finished"
        );
        Ok(summary)
    }
}

async fn run_environment(
    shared: Arc<RunShared>,
    spec: Arc<EnvironmentSpec>,
    sink: Option<LiveSink>,
    cancel: CancellationToken,
) -> ExecutionResult {
    let started_at = Utc::now();
    let start = Instant::now();

    if cancel.is_cancelled() {
        return ExecutionResult::cancelled(spec.name(), String::new(), Duration::ZERO, started_at);
    }

    if shared.progress {
        println!("{}", t!("execution.env_start", env = spec.name()).bold());
    }

    let ctx = match shared.provisioner.acquire(&spec, sink.as_ref(), &cancel).await {
        Ok(ctx) => ctx,
        Err(ProvisionError::Cancelled) => {
            return ExecutionResult::cancelled(spec.name(), String::new(), start.elapsed(), started_at);
        }
        Err(e) => {
            let message = error_chain(&e);
            tracing::warn!(env = %spec.name(), error = %message, "provisioning failed");
            if shared.progress {
                println!(
                    "{}",
                    t!("execution.provision_failed", env = spec.name(), error = message).red()
                );
            }
            let failure = FailureDetail::Provision {
                message: message.clone(),
            };
            return ExecutionResult::failed(spec.name(), failure, message, start.elapsed(), started_at);
        }
    };

    let result = shared
        .runner
        .run(
            &spec,
            &ctx,
            &shared.passthrough,
            &shared.overrides,
            sink.as_ref(),
            &cancel,
        )
        .await;

    if result.is_failure() && shared.keep_failed {
        retain_failed(&ctx, &shared.work_dir);
    }
    result
}

/// Copies a temporary context to `<work_dir>/failed/<name>` so it survives the
/// end of the run. Cached contexts already persist and are left alone.
fn retain_failed(ctx: &Context, work_dir: &Path) {
    let Some(root) = ctx.root().filter(|_| ctx.is_temporary()) else {
        return;
    };
    let dest = work_dir.join("failed").join(ctx.name());
    match copy_dir_all(root, &dest) {
        Ok(()) => {
            tracing::info!(env = %ctx.name(), path = %dest.display(), "retained failed context");
        }
        Err(e) => {
            tracing::warn!(env = %ctx.name(), error = %e, "failed to retain context");
        }
    }
}

/// The error message followed by every source, separated by `: `.
fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
