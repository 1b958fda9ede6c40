// Shared test helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use envmatrix::core::config::ConfigModel;
use envmatrix::core::provision::ENV_NAME_VAR;
use envmatrix::infra::command::{
    Invocation, LiveSink, ProcessExecutor, ProcessOutcome, Termination,
};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the fake executor does for a matching command.
#[derive(Debug, Clone)]
pub enum Script {
    /// Waits for `delay`, then exits with `code` after printing `output`.
    Exit {
        code: i32,
        output: String,
        delay: Duration,
    },
    /// The program cannot be started.
    SpawnError,
}

impl Script {
    pub fn ok(output: &str) -> Self {
        Script::Exit {
            code: 0,
            output: output.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn exit(code: i32) -> Self {
        Script::Exit {
            code,
            output: format!("exited with {code}"),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(code: i32, delay: Duration) -> Self {
        Script::Exit {
            code,
            output: String::new(),
            delay,
        }
    }
}

/// A call recorded by the fake executor.
#[derive(Debug, Clone)]
pub struct Call {
    pub env: Option<String>,
    pub argv: Vec<String>,
    pub invocation: Invocation,
}

/// A scripted `ProcessExecutor`.
///
/// Commands are matched first by their full argv joined with spaces, then by
/// the program name. Unmatched commands succeed and echo their argv.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, key: &str, script: Script) {
        self.scripts.lock().unwrap().insert(key.to_string(), script);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|c| c.argv).collect()
    }

    /// Calls whose program is `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.argv.first().map(String::as_str) == Some(program))
            .collect()
    }

    /// Calls made on behalf of environment `env`.
    pub fn calls_for(&self, env: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.env.as_deref() == Some(env))
            .collect()
    }

    fn lookup(&self, argv: &[String]) -> Option<Script> {
        let scripts = self.scripts.lock().unwrap();
        scripts
            .get(&argv.join(" "))
            .or_else(|| argv.first().and_then(|program| scripts.get(program)))
            .cloned()
    }
}

#[async_trait]
impl ProcessExecutor for FakeExecutor {
    async fn execute(
        &self,
        invocation: &Invocation,
        sink: Option<&LiveSink>,
        cancel: &CancellationToken,
    ) -> io::Result<ProcessOutcome> {
        self.calls.lock().unwrap().push(Call {
            env: invocation.env.get(ENV_NAME_VAR).cloned(),
            argv: invocation.argv.clone(),
            invocation: invocation.clone(),
        });

        let script = self
            .lookup(&invocation.argv)
            .unwrap_or_else(|| Script::ok(&invocation.argv.join(" ")));

        let (code, output, delay) = match script {
            Script::SpawnError => {
                return Err(io::Error::new(io::ErrorKind::NotFound, "program not found"));
            }
            Script::Exit {
                code,
                output,
                delay,
            } => (code, output, delay),
        };

        if let Some(sink) = sink {
            for line in output.lines() {
                sink.emit(line);
            }
        }

        let limit = invocation.timeout.unwrap_or(Duration::MAX);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(ProcessOutcome { termination: Termination::Cancelled, output });
            }
            _ = tokio::time::sleep(limit), if delay > limit => {
                return Ok(ProcessOutcome { termination: Termination::TimedOut, output });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        Ok(ProcessOutcome::exited(code, output))
    }
}

/// Parses a config from TOML text.
pub fn config_from(toml: &str) -> Arc<ConfigModel> {
    Arc::new(toml.parse::<ConfigModel>().expect("test config should be valid"))
}
