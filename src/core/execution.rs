//! # Command Runner Module / 命令执行模块
//!
//! Runs an environment's command list inside its provisioned context.
//! Commands run strictly in order and the first failure stops the
//! environment. Passthrough arguments are appended to the final command only.
//!
//! 在已准备的上下文中运行环境的命令列表。
//! 命令严格按顺序运行，第一个失败会停止该环境。透传参数只追加到最后一个命令。

use chrono::Utc;
use colored::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::models::{EnvironmentSpec, ExecutionResult, FailureDetail};
use crate::core::provision::Context;
use crate::infra::command::{Invocation, LiveSink, ProcessExecutor, Termination, display_argv};
use crate::infra::t;

/// Builds the argv list an environment will execute, with passthrough
/// arguments appended to the last command.
///
/// 构建环境将要执行的 argv 列表，透传参数追加到最后一个命令。
pub fn command_plan(spec: &EnvironmentSpec, passthrough: &[String]) -> Vec<Vec<String>> {
    let mut commands = spec.commands().to_vec();
    if let Some(last) = commands.last_mut() {
        last.extend(passthrough.iter().cloned());
    }
    commands
}

/// Merges the context variables with user overrides. Overrides win.
pub fn merged_env(
    ctx: &Context,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = ctx.env().clone();
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Executes command lists through a `ProcessExecutor`.
/// 通过 `ProcessExecutor` 执行命令列表。
pub struct CommandRunner {
    project_root: PathBuf,
    executor: Arc<dyn ProcessExecutor>,
    show_progress: bool,
}

impl CommandRunner {
    pub fn new(project_root: impl Into<PathBuf>, executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            project_root: project_root.into(),
            executor,
            show_progress: false,
        }
    }

    /// Prints a colored line per command to stdout while running.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Runs every command of `spec` in `ctx` and reports the outcome.
    ///
    /// * Success when every command exits zero or with one of the spec's
    ///   `ok_exit_codes`.
    /// * Failed at the first command that exits with any other code, times
    ///   out or cannot be started. Later commands are not run.
    /// * Cancelled when `cancel` fires; the running process is killed.
    ///
    /// The combined output of every command that ran is kept in the result,
    /// each command preceded by a `$ <argv>` header line.
    pub async fn run(
        &self,
        spec: &EnvironmentSpec,
        ctx: &Context,
        passthrough: &[String],
        overrides: &BTreeMap<String, String>,
        sink: Option<&LiveSink>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let env = merged_env(ctx, overrides);
        let commands = command_plan(spec, passthrough);
        let total = commands.len();
        let mut output = String::new();

        for (index, argv) in commands.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return ExecutionResult::cancelled(spec.name(), output, start.elapsed(), started_at);
            }

            let rendered = display_argv(&argv);
            output.push_str(&format!("$ {rendered}\n"));
            if let Some(sink) = sink {
                sink.emit(&format!("$ {rendered}"));
            }
            if self.show_progress {
                println!(
                    "{}",
                    t!(
                        "execution.command_start",
                        env = spec.name(),
                        index = index + 1,
                        total = total,
                        command = rendered
                    )
                    .cyan()
                );
            }
            tracing::debug!(env = %spec.name(), index, command = %rendered, "running command");

            let invocation = Invocation::new(argv.clone(), &self.project_root)
                .with_env(env.clone())
                .with_timeout(spec.timeout());

            let outcome = match self.executor.execute(&invocation, sink, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(env = %spec.name(), command = %rendered, error = %e, "failed to start command");
                    output.push_str(&format!("{e}\n"));
                    let failure = FailureDetail::Spawn {
                        index,
                        argv,
                        message: e.to_string(),
                    };
                    return ExecutionResult::failed(spec.name(), failure, output, start.elapsed(), started_at);
                }
            };
            output.push_str(&outcome.output);

            match outcome.termination {
                Termination::Exited(Some(0)) => continue,
                Termination::Exited(Some(code)) if spec.accepts_exit_code(code) => {
                    tracing::debug!(env = %spec.name(), command = %rendered, code, "accepted non-zero exit code");
                    if self.show_progress {
                        println!(
                            "{}",
                            t!(
                                "execution.command_accepted",
                                env = spec.name(),
                                command = rendered,
                                code = code
                            )
                            .yellow()
                        );
                    }
                    continue;
                }
                Termination::Exited(exit_code) => {
                    if self.show_progress {
                        println!(
                            "{}",
                            t!(
                                "execution.command_failed",
                                env = spec.name(),
                                command = rendered,
                                code = exit_code.map_or_else(|| "-".to_string(), |c| c.to_string())
                            )
                            .red()
                        );
                    }
                    let failure = FailureDetail::Command {
                        index,
                        argv,
                        exit_code,
                    };
                    return ExecutionResult::failed(spec.name(), failure, output, start.elapsed(), started_at);
                }
                Termination::TimedOut => {
                    let timeout_secs = spec.timeout().map_or(0, |d| d.as_secs());
                    if self.show_progress {
                        println!(
                            "{}",
                            t!(
                                "execution.command_timeout",
                                env = spec.name(),
                                command = rendered,
                                timeout = timeout_secs
                            )
                            .yellow()
                        );
                    }
                    let failure = FailureDetail::Timeout {
                        index,
                        argv,
                        timeout_secs,
                    };
                    return ExecutionResult::failed(spec.name(), failure, output, start.elapsed(), started_at);
                }
                Termination::Cancelled => {
                    return ExecutionResult::cancelled(spec.name(), output, start.elapsed(), started_at);
                }
            }
        }

        if self.show_progress {
            println!(
                "{}",
                t!(
                    "execution.env_passed",
                    env = spec.name(),
                    duration = format!("{:.2}", start.elapsed().as_secs_f64())
                )
                .green()
            );
        }
        ExecutionResult::success(spec.name(), output, start.elapsed(), started_at)
    }
}
