//! Error types for the orchestration core.
//!
//! `ConfigError`, `RunError::UnmappedAxisValue` and
//! `RunError::NoEnvironmentsSelected` are fatal and raised before any side
//! effect. `ProvisionError` is scoped to a single environment and ends up in
//! that environment's `ExecutionResult`.

use std::path::PathBuf;

/// Errors raised while parsing a brace pattern such as `py{38,39}-lint`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("unclosed brace group starting at offset {offset}")]
    UnclosedGroup { offset: usize },

    #[error("unexpected '}}' at offset {offset}")]
    UnexpectedClose { offset: usize },

    #[error("nested brace group at offset {offset}")]
    NestedGroup { offset: usize },

    #[error("empty brace group at offset {offset}")]
    EmptyGroup { offset: usize },

    #[error("empty alternative in brace group at offset {offset}")]
    EmptyToken { offset: usize },

    #[error("invalid character {ch:?} at offset {offset}")]
    InvalidCharacter { ch: char, offset: usize },

    #[error("expanded name '{name}' starts with '.'")]
    HiddenName { name: String },
}

/// Malformed or contradictory declarative input.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("malformed pattern '{pattern}': {reason}")]
    MalformedPattern {
        pattern: String,
        #[source]
        reason: PatternError,
    },

    #[error("environment name '{name}' is produced more than once")]
    DuplicateName { name: String },

    #[error("environment '{name}' declares no commands")]
    MissingCommands { name: String },

    #[error("environment '{name}' has an unparsable command: {command}")]
    MalformedCommand { name: String, command: String },

    #[error("environment '{name}' declares dependencies but is not isolated")]
    DependenciesWithoutIsolation { name: String },

    #[error("environment '{name}' has an empty installer command")]
    EmptyInstaller { name: String },

    #[error("CI axis value '{value}' maps to no environments")]
    EmptyAxisMapping { value: String },

    #[error("environment '{name}' has a zero timeout")]
    InvalidTimeout { name: String },

    #[error("jobs must be at least 1")]
    InvalidJobs,
}

/// Failure to materialize an execution context. Scoped to one environment.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("interpreter '{selector}' not found")]
    InterpreterNotFound { selector: String },

    #[error("dependency installation failed (exit code {})", display_code(.exit_code))]
    DependencyInstallFailed { exit_code: Option<i32> },

    #[error("failed to start installer: {message}")]
    InstallerSpawn { message: String },

    #[error("provisioning was cancelled")]
    Cancelled,

    #[error("I/O error while provisioning {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt context state file {path}")]
    State {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("CI axis value '{value}' is not mapped (known values: {})", .known.join(", "))]
    UnmappedAxisValue { value: String, known: Vec<String> },

    #[error("no environments selected (selectors: {})", describe_selectors(.selectors))]
    NoEnvironmentsSelected { selectors: Vec<String> },

    #[error("environment '{name}' reported more than one result")]
    DuplicateResult { name: String },

    #[error("result for unknown environment '{name}'")]
    UnknownResult { name: String },

    #[error("environment '{name}' finished without a result")]
    MissingResult { name: String },

    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_selectors(selectors: &[String]) -> String {
    if selectors.is_empty() {
        "<default>".to_string()
    } else {
        selectors.join(", ")
    }
}
