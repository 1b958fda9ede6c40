//! # Configuration Module / 配置模块
//!
//! Parses the declarative `EnvMatrix.toml` file into a validated, immutable
//! `ConfigModel`. Every fragment inherits unset fields from `[defaults]`, and
//! validation (patterns, duplicate names, commands, CI mapping) runs fully
//! before anything is executed.
//!
//! 将声明式的 `EnvMatrix.toml` 文件解析为经过验证的不可变 `ConfigModel`。
//! 每个片段从 `[defaults]` 继承未设置的字段，验证（模式、重复名称、命令、CI 映射）
//! 在执行任何操作之前完整运行。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::core::bridge::CiAxisMapping;
use crate::core::error::ConfigError;
use crate::core::expander::MatrixExpander;
use crate::core::models::{EnvironmentSpec, SpecParts};

/// Default configuration file name, looked up in the project root.
pub const DEFAULT_CONFIG_FILE: &str = "EnvMatrix.toml";

/// Installer used when neither the fragment nor the defaults set one.
/// The pinned dependency list is appended after these arguments.
pub const DEFAULT_INSTALLER: &[&str] = &["pip", "install", "--prefix", "{envdir}"];

/// A single command, written either as a shell-like string or as an argv array.
/// 单个命令，可以写成类 shell 字符串，也可以写成 argv 数组。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// Expanded with `shellexpand` (`~`, `$VAR`) and split with `shlex`.
    Shell(String),
    /// Used verbatim.
    Argv(Vec<String>),
}

impl CommandLine {
    /// Converts the command into an argv vector. Returns `None` when the
    /// command is empty or cannot be split.
    pub fn to_argv(&self) -> Option<Vec<String>> {
        let argv = match self {
            CommandLine::Shell(line) => {
                let expanded = shellexpand::full(line).ok()?;
                shlex::split(&expanded)?
            }
            CommandLine::Argv(argv) => argv.clone(),
        };
        match argv.first() {
            Some(program) if !program.is_empty() => Some(argv),
            _ => None,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Shell(line) => write!(f, "{line}"),
            CommandLine::Argv(argv) => write!(f, "{argv:?}"),
        }
    }
}

/// The options declared for one name or pattern before expansion.
/// Every field is optional; unset fields inherit from `[defaults]`.
///
/// 在展开之前为某个名称或模式声明的选项。
/// 每个字段都是可选的；未设置的字段从 `[defaults]` 继承。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Fragment {
    /// Interpreter selector. `{0}`, `{1}`, ... are replaced with the factor
    /// tokens of the expanded name, `{envname}` with the name itself.
    /// 解释器选择器。`{0}`、`{1}` 等会被替换为展开名称的因子，`{envname}` 替换为名称本身。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    /// Pinned dependency specs, passed verbatim to the installer.
    /// 固定版本的依赖规格，原样传递给安装器。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    /// Ordered commands. At least one is required after inheritance.
    /// 有序的命令列表。继承后至少需要一个。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<CommandLine>>,
    /// Whether the environment gets its own install root. Defaults to `true`.
    /// 环境是否拥有自己的安装根目录。默认为 `true`。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolate: Option<bool>,
    /// Installer argv template; `{envdir}` and `{interpreter}` are substituted.
    /// 安装器 argv 模板；会替换 `{envdir}` 和 `{interpreter}`。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer: Option<Vec<String>>,
    /// Extra environment variables for every command.
    /// 每个命令的额外环境变量。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setenv: Option<BTreeMap<String, String>>,
    /// Per-command timeout in seconds.
    /// 每个命令的超时时间（秒）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Non-zero exit codes that still count as success for every command.
    /// 对每个命令仍视为成功的非零退出码。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok_exit_codes: Option<Vec<i32>>,
}

impl Fragment {
    /// Fills every unset field from `defaults`. `setenv` maps are merged
    /// key-wise, with this fragment's values taking precedence.
    pub fn inherit(&self, defaults: &Fragment) -> Fragment {
        let setenv = match (&defaults.setenv, &self.setenv) {
            (Some(base), Some(own)) => {
                let mut merged = base.clone();
                merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
                Some(merged)
            }
            (base, own) => own.clone().or_else(|| base.clone()),
        };

        Fragment {
            interpreter: self.interpreter.clone().or_else(|| defaults.interpreter.clone()),
            dependencies: self
                .dependencies
                .clone()
                .or_else(|| defaults.dependencies.clone()),
            commands: self.commands.clone().or_else(|| defaults.commands.clone()),
            isolate: self.isolate.or(defaults.isolate),
            installer: self.installer.clone().or_else(|| defaults.installer.clone()),
            setenv,
            timeout_secs: self.timeout_secs.or(defaults.timeout_secs),
            ok_exit_codes: self
                .ok_exit_codes
                .clone()
                .or_else(|| defaults.ok_exit_codes.clone()),
        }
    }

    /// Resolves this (already inherited) fragment into an immutable spec for `name`.
    ///
    /// 将此（已继承的）片段解析为 `name` 的不可变规格。
    pub fn resolve(&self, name: &str, factors: &[String]) -> Result<EnvironmentSpec, ConfigError> {
        let commands = self
            .commands
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|command| {
                command.to_argv().ok_or_else(|| ConfigError::MalformedCommand {
                    name: name.to_string(),
                    command: command.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if commands.is_empty() {
            return Err(ConfigError::MissingCommands {
                name: name.to_string(),
            });
        }

        let isolate = self.isolate.unwrap_or(true);
        let dependencies = self.dependencies.clone().unwrap_or_default();
        if !isolate && !dependencies.is_empty() {
            return Err(ConfigError::DependenciesWithoutIsolation {
                name: name.to_string(),
            });
        }

        let installer = self
            .installer
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTALLER.iter().map(|s| s.to_string()).collect());
        if installer.first().is_none_or(|program| program.is_empty()) {
            return Err(ConfigError::EmptyInstaller {
                name: name.to_string(),
            });
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidTimeout {
                name: name.to_string(),
            });
        }

        let interpreter = self
            .interpreter
            .as_deref()
            .map(|selector| substitute_factors(selector, name, factors));

        Ok(EnvironmentSpec::new(
            name,
            factors.to_vec(),
            SpecParts {
                interpreter,
                dependencies,
                commands,
                isolate,
                setenv: self.setenv.clone().unwrap_or_default(),
                installer,
                timeout_secs: self.timeout_secs,
                ok_exit_codes: self.ok_exit_codes.clone().unwrap_or_default(),
            },
        ))
    }
}

/// Replaces `{envname}` and positional `{N}` placeholders.
fn substitute_factors(template: &str, name: &str, factors: &[String]) -> String {
    let mut out = template.replace("{envname}", name);
    for (index, factor) in factors.iter().enumerate() {
        out = out.replace(&format!("{{{index}}}"), factor);
    }
    out
}

/// A fragment bound to a name or brace pattern (`[[env]]` in the file).
/// 绑定到名称或花括号模式的片段（文件中的 `[[env]]`）。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PatternFragment {
    pub pattern: String,
    #[serde(flatten)]
    pub fragment: Fragment,
}

/// The ordered list of name patterns making up the default matrix.
/// 组成默认矩阵的有序名称模式列表。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixDefinition {
    patterns: Vec<String>,
}

impl MatrixDefinition {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// The `[ci]` section: how an external CI axis maps onto environments.
/// `[ci]` 部分：外部 CI 维度如何映射到环境。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CiSection {
    /// Environment variable the CLI reads the axis value from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis_variable: Option<String>,
    /// Axis value -> environment names.
    #[serde(default)]
    pub map: BTreeMap<String, Vec<String>>,
}

/// The raw file layout, as deserialized from TOML.
/// 从 TOML 反序列化得到的原始文件结构。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatrixFile {
    /// The language for output messages (e.g., "en", "zh-CN").
    /// 输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub envlist: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub keep_failed: bool,
    #[serde(default)]
    pub defaults: Fragment,
    #[serde(default)]
    pub env: Vec<PatternFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiSection>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".envmatrix")
}

fn default_true() -> bool {
    true
}

/// The validated, process-wide immutable configuration.
/// Built once at startup and passed explicitly (usually as `Arc<ConfigModel>`).
///
/// 经过验证的进程级不可变配置。
/// 在启动时构建一次，并显式传递（通常为 `Arc<ConfigModel>`）。
#[derive(Debug)]
pub struct ConfigModel {
    language: String,
    jobs: Option<usize>,
    work_dir: PathBuf,
    cache: bool,
    keep_failed: bool,
    matrix: MatrixDefinition,
    specs: Vec<Arc<EnvironmentSpec>>,
    envlist: Vec<String>,
    ci: CiAxisMapping,
    axis_variable: Option<String>,
}

impl ConfigModel {
    /// Validates a deserialized file and resolves every environment.
    pub fn from_file(file: MatrixFile) -> Result<Self, ConfigError> {
        if file.jobs == Some(0) {
            return Err(ConfigError::InvalidJobs);
        }

        let matrix = MatrixDefinition::new(file.envlist);
        let expanded = MatrixExpander::expand(&matrix, &file.defaults, &file.env)?;

        let ci_section = file.ci.unwrap_or_default();
        let ci = CiAxisMapping::new(ci_section.map)?;

        Ok(Self {
            language: file.language,
            jobs: file.jobs,
            work_dir: file.work_dir,
            cache: file.cache,
            keep_failed: file.keep_failed,
            matrix,
            specs: expanded.specs,
            envlist: expanded.envlist,
            ci,
            axis_variable: ci_section.axis_variable,
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn jobs(&self) -> Option<usize> {
        self.jobs
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn cache(&self) -> bool {
        self.cache
    }

    pub fn keep_failed(&self) -> bool {
        self.keep_failed
    }

    pub fn matrix(&self) -> &MatrixDefinition {
        &self.matrix
    }

    /// Every known environment in spec order.
    pub fn specs(&self) -> &[Arc<EnvironmentSpec>] {
        &self.specs
    }

    pub fn spec(&self, name: &str) -> Option<&Arc<EnvironmentSpec>> {
        self.specs.iter().find(|spec| spec.name() == name)
    }

    /// Names selected when no selector is given: the envlist, or every known
    /// environment when the envlist is empty.
    pub fn default_selection(&self) -> Vec<&str> {
        if self.envlist.is_empty() {
            self.specs.iter().map(|spec| spec.name()).collect()
        } else {
            self.envlist.iter().map(String::as_str).collect()
        }
    }

    pub fn is_default(&self, name: &str) -> bool {
        self.envlist.iter().any(|n| n == name)
    }

    pub fn ci(&self) -> &CiAxisMapping {
        &self.ci
    }

    pub fn axis_variable(&self) -> Option<&str> {
        self.axis_variable.as_deref()
    }
}

impl FromStr for ConfigModel {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let file: MatrixFile = toml::from_str(text)?;
        Self::from_file(file)
    }
}

/// Reads and validates the configuration file at `path`.
///
/// 读取并验证 `path` 处的配置文件。
pub fn load_config(path: &Path) -> Result<ConfigModel, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let model: ConfigModel = content.parse()?;
    tracing::info!(
        path = %path.display(),
        environments = model.specs().len(),
        "loaded configuration"
    );
    Ok(model)
}
