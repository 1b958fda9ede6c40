//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout envmatrix:
//! the resolved environment specification, the outcome of one environment,
//! and the ordered summary of a whole run.
//!
//! 此模块定义了 envmatrix 中使用的核心数据结构：
//! 已解析的环境规格、单个环境的执行结果以及整个运行的有序摘要。

use crate::infra::t;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A fully resolved environment, produced by matrix expansion.
/// Fields are private: once resolved a spec is never mutated, and it is shared
/// between tasks behind an `Arc`.
///
/// 由矩阵展开产生的完全解析的环境。
/// 字段是私有的：一旦解析完成就不会再被修改，并通过 `Arc` 在任务之间共享。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentSpec {
    name: String,
    factors: Vec<String>,
    interpreter: Option<String>,
    dependencies: Vec<String>,
    commands: Vec<Vec<String>>,
    isolate: bool,
    setenv: BTreeMap<String, String>,
    installer: Vec<String>,
    timeout_secs: Option<u64>,
    ok_exit_codes: Vec<i32>,
}

/// Builder-style parts used by the expander to assemble a spec.
/// 展开器用于组装规格的各个部分。
#[derive(Debug, Clone, Default)]
pub struct SpecParts {
    pub interpreter: Option<String>,
    pub dependencies: Vec<String>,
    pub commands: Vec<Vec<String>>,
    pub isolate: bool,
    pub setenv: BTreeMap<String, String>,
    pub installer: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub ok_exit_codes: Vec<i32>,
}

impl EnvironmentSpec {
    pub fn new(name: impl Into<String>, factors: Vec<String>, parts: SpecParts) -> Self {
        Self {
            name: name.into(),
            factors,
            interpreter: parts.interpreter,
            dependencies: parts.dependencies,
            commands: parts.commands,
            isolate: parts.isolate,
            setenv: parts.setenv,
            installer: parts.installer,
            timeout_secs: parts.timeout_secs,
            ok_exit_codes: parts.ok_exit_codes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The token chosen from each brace group, left to right.
    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    /// The interpreter selector with `{N}` and `{envname}` placeholders already substituted.
    pub fn interpreter(&self) -> Option<&str> {
        self.interpreter.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn commands(&self) -> &[Vec<String>] {
        &self.commands
    }

    pub fn isolate(&self) -> bool {
        self.isolate
    }

    pub fn setenv(&self) -> &BTreeMap<String, String> {
        &self.setenv
    }

    pub fn installer(&self) -> &[String] {
        &self.installer
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn ok_exit_codes(&self) -> &[i32] {
        &self.ok_exit_codes
    }

    /// Zero, or one of the configured `ok_exit_codes`.
    pub fn accepts_exit_code(&self, code: i32) -> bool {
        code == 0 || self.ok_exit_codes.contains(&code)
    }
}

/// The final state of one environment in a run.
/// 单个环境在一次运行中的最终状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Every command exited with status zero.
    /// 所有命令都以零状态退出。
    Success,
    /// Provisioning failed or a command exited non-zero.
    /// 环境准备失败或某个命令以非零状态退出。
    Failed,
    /// An external interrupt stopped the environment.
    /// 外部中断停止了该环境。
    Cancelled,
}

/// Why an environment ended up `Failed`.
/// 环境最终为 `Failed` 的原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureDetail {
    /// The context could not be provisioned.
    Provision { message: String },
    /// A command exited with a code outside `ok_exit_codes`; remaining
    /// commands were skipped.
    Command {
        index: usize,
        argv: Vec<String>,
        exit_code: Option<i32>,
    },
    /// A command exceeded the configured timeout and was killed.
    Timeout {
        index: usize,
        argv: Vec<String>,
        timeout_secs: u64,
    },
    /// A command could not be started at all.
    Spawn {
        index: usize,
        argv: Vec<String>,
        message: String,
    },
    /// The task running the environment died unexpectedly.
    Internal { message: String },
}

impl FailureDetail {
    /// The argv of the failing command, if the failure came from a command.
    pub fn failing_command(&self) -> Option<&[String]> {
        match self {
            FailureDetail::Command { argv, .. }
            | FailureDetail::Timeout { argv, .. }
            | FailureDetail::Spawn { argv, .. } => Some(argv),
            FailureDetail::Provision { .. } | FailureDetail::Internal { .. } => None,
        }
    }
}

/// The outcome of one executed environment.
/// 单个已执行环境的结果。
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub name: String,
    pub status: Status,
    /// Exit code of the deciding process. `None` when no process produced one
    /// (provisioning failed, process killed, spawn failed).
    pub exit_code: Option<i32>,
    pub duration: Duration,
    /// The complete combined output of every command that ran.
    pub output: String,
    pub failure: Option<FailureDetail>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(
        name: impl Into<String>,
        output: String,
        duration: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            status: Status::Success,
            exit_code: Some(0),
            duration,
            output,
            failure: None,
            started_at,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        failure: FailureDetail,
        output: String,
        duration: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        let exit_code = match &failure {
            FailureDetail::Command { exit_code, .. } => *exit_code,
            _ => None,
        };
        Self {
            name: name.into(),
            status: Status::Failed,
            exit_code,
            duration,
            output,
            failure: Some(failure),
            started_at,
        }
    }

    pub fn cancelled(
        name: impl Into<String>,
        output: String,
        duration: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            status: Status::Cancelled,
            exit_code: None,
            duration,
            output,
            failure: None,
            started_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status == Status::Failed
    }

    /// Gets the status of the result as a localized string for display.
    /// 以本地化字符串形式获取结果状态以供显示。
    pub fn get_status_str(&self, locale: &str) -> String {
        match (self.status, &self.failure) {
            (Status::Success, _) => t!("report.status_success", locale = locale).to_string(),
            (Status::Failed, Some(FailureDetail::Timeout { .. })) => {
                t!("report.status_timeout", locale = locale).to_string()
            }
            (Status::Failed, Some(FailureDetail::Provision { .. })) => {
                t!("report.status_provision_failed", locale = locale).to_string()
            }
            (Status::Failed, _) => t!("report.status_failed", locale = locale).to_string(),
            (Status::Cancelled, _) => t!("report.status_cancelled", locale = locale).to_string(),
        }
    }

    /// Gets the appropriate CSS class for the status.
    pub fn get_status_class(&self) -> &'static str {
        match (self.status, &self.failure) {
            (Status::Success, _) => "status-success",
            (Status::Failed, Some(FailureDetail::Timeout { .. })) => "status-timeout",
            (Status::Failed, _) => "status-failed",
            (Status::Cancelled, _) => "status-cancelled",
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}", self.name, self.status)?;
        if let Some(code) = self.exit_code {
            write!(f, ", exit code {code}")?;
        }
        write!(f, ")")
    }
}

/// The ordered outcome of a whole run.
/// Results are kept in spec order, and `overall_success` is the logical AND of
/// every result being a success.
///
/// 整个运行的有序结果。
/// 结果按规格顺序保存，`overall_success` 是所有结果均为成功的逻辑与。
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    results: Vec<ExecutionResult>,
    overall_success: bool,
}

impl RunSummary {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        let overall_success = results.iter().all(ExecutionResult::is_success);
        Self {
            results,
            overall_success,
        }
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn overall_success(&self) -> bool {
        self.overall_success
    }

    pub fn get(&self, name: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn count(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn total_duration(&self) -> Duration {
        self.results.iter().map(|r| r.duration).sum()
    }
}
