//! # Process Execution Module / 进程执行模块
//!
//! External tools (installers, test runners, linters, formatters) are opaque
//! collaborators behind the `ProcessExecutor` trait:
//! `execute(argv, env, cwd) -> (exit code, captured output)`. The core never
//! inspects tool-specific output. `SystemExecutor` is the real implementation,
//! built on `tokio::process` with combined stdout/stderr capture, live line
//! forwarding, timeouts and kill-on-cancel. On Unix each command runs in its
//! own process group and a kill signals the whole group.
//!
//! 外部工具（安装器、测试运行器、代码检查器、格式化器）都是 `ProcessExecutor`
//! trait 背后的不透明协作者。核心从不解析特定工具的输出。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::SplitStream;
use tokio_util::sync::CancellationToken;

use crate::infra::t;

/// One process to run.
/// 要运行的单个进程。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    /// Variables set on top of the inherited process environment.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            env: BTreeMap::new(),
            cwd: cwd.into(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// A shell-quoted rendering of the argv, for logs and reports.
    pub fn display(&self) -> String {
        display_argv(&self.argv)
    }
}

/// Renders an argv the way a user would type it.
pub fn display_argv(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}

/// How a process ended.
/// 进程的结束方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own. `None` when it was killed by a signal.
    Exited(Option<i32>),
    /// The timeout elapsed and the process was killed.
    TimedOut,
    /// The cancellation token fired and the process was killed.
    Cancelled,
}

/// The outcome of one process: its termination and combined output.
/// 单个进程的结果：终止方式和合并输出。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub termination: Termination,
    pub output: String,
}

impl ProcessOutcome {
    pub fn exited(code: i32, output: impl Into<String>) -> Self {
        Self {
            termination: Termination::Exited(Some(code)),
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(Some(0))
    }
}

/// A line of output produced by some environment, forwarded while it runs.
/// 某个环境在运行时产生并转发的一行输出。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub env: Arc<str>,
    pub line: String,
}

/// Sender half of the live output channel, tagged with an environment name.
/// 实时输出通道的发送端，带有环境名称标签。
#[derive(Debug, Clone)]
pub struct LiveSink {
    env: Arc<str>,
    tx: mpsc::UnboundedSender<OutputLine>,
}

impl LiveSink {
    pub fn new(env: &str, tx: mpsc::UnboundedSender<OutputLine>) -> Self {
        Self {
            env: Arc::from(env),
            tx,
        }
    }

    pub fn emit(&self, line: &str) {
        // A closed receiver only means nobody is watching live output.
        let _ = self.tx.send(OutputLine {
            env: Arc::clone(&self.env),
            line: line.to_string(),
        });
    }
}

/// The opaque subprocess collaborator.
/// 不透明的子进程协作者。
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Runs `invocation` to completion, forwarding each output line to `sink`
    /// while it is produced. Cancelling `cancel` must terminate the process,
    /// not merely stop waiting for it.
    ///
    /// An `Err` means the process could not be started.
    async fn execute(
        &self,
        invocation: &Invocation,
        sink: Option<&LiveSink>,
        cancel: &CancellationToken,
    ) -> io::Result<ProcessOutcome>;
}

/// Runs processes on the host with `tokio::process`.
/// 使用 `tokio::process` 在主机上运行进程。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

#[async_trait]
impl ProcessExecutor for SystemExecutor {
    async fn execute(
        &self,
        invocation: &Invocation,
        sink: Option<&LiveSink>,
        cancel: &CancellationToken,
    ) -> io::Result<ProcessOutcome> {
        let (program, args) = invocation.argv.split_first().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                t!("process.empty_command").to_string(),
            )
        })?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .envs(&invocation.env)
            .current_dir(&invocation.cwd)
            .kill_on_drop(true);

        spawn_and_capture(cmd, sink, cancel, invocation.timeout).await
    }
}

/// Spawns a command and captures its stdout and stderr.
/// Both streams are read concurrently, merged line by line into one string,
/// and forwarded to `sink` as they arrive.
///
/// 派生一个命令并捕获其 stdout 和 stderr。
/// 两个流被并发读取，逐行合并为一个字符串，并在到达时转发给 `sink`。
pub async fn spawn_and_capture(
    mut cmd: tokio::process::Command,
    sink: Option<&LiveSink>,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> io::Result<ProcessOutcome> {
    // Own process group, so a kill reaches everything the command started.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other(t!("process.capture_stdout_failed").to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other(t!("process.capture_stderr_failed").to_string()))?;

    let mut lines = SplitStream::new(BufReader::new(stdout).split(b'\n'))
        .merge(SplitStream::new(BufReader::new(stderr).split(b'\n')));

    let deadline = tokio::time::sleep(timeout.unwrap_or_default());
    tokio::pin!(deadline);

    let mut output = String::new();
    let mut streams_open = true;

    let termination = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill_quietly(&mut child).await;
                break Termination::Cancelled;
            }
            _ = &mut deadline, if timeout.is_some() => {
                kill_quietly(&mut child).await;
                break Termination::TimedOut;
            }
            chunk = lines.next(), if streams_open => match chunk {
                Some(Ok(bytes)) => {
                    let line = String::from_utf8_lossy(&bytes);
                    let line = line.strip_suffix('\r').unwrap_or(&line);
                    if let Some(sink) = sink {
                        sink.emit(line);
                    }
                    output.push_str(line);
                    output.push('\n');
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "failed to read process output");
                    streams_open = false;
                }
                None => streams_open = false,
            },
            status = child.wait(), if !streams_open => {
                break Termination::Exited(status?.code());
            }
        }
    };

    Ok(ProcessOutcome {
        termination,
        output,
    })
}

/// Kills the child's whole process group, then the child itself.
async fn kill_quietly(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill child process");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg takes no pointers; the group was created for this child.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to kill process group");
        }
    }
}
