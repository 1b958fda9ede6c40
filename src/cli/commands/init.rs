//! # Init Command Module / 初始化命令模块
//!
//! This module implements the `init` command for the envmatrix CLI,
//! which creates a new matrix configuration file.
//!
//! 此模块实现了 envmatrix CLI 的 `init` 命令，
//! 用于创建新的矩阵配置文件。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::{fs, path::PathBuf};

use crate::infra::t;

const DEFAULT_ENVLIST: &str = "py{3.11,3.12}";
const DEFAULT_COMMAND: &str = "pytest -q";

/// Quotes `value` as a TOML basic string.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// Renders the starter configuration. User input is quoted, so any text
/// typed at the prompts stays a single TOML string.
pub fn render_config(language: &str, envlist: &str, command: &str) -> String {
    let language = toml_string(language);
    let envlist = toml_string(envlist);
    let command = toml_string(command);
    format!(
        r#"# Environment Matrix Configuration / 环境矩阵配置

# Language for reports / 报告语言
language = {language}

# Environments run by default; braces expand to every alternative
# 默认运行的环境；花括号会展开为每个备选项
envlist = [{envlist}, "lint"]

# Keep provisioned contexts between runs / 在运行之间保留已准备的上下文
cache = true

[defaults]
# {{0}} is the first factor of the environment name / {{0}} 是环境名的第一个因子
interpreter = "python{{0}}"
dependencies = ["pytest==8.2.0"]
commands = [{command}]
installer = ["pip", "install", "--prefix", "{{envdir}}"]
timeout_secs = 600

[[env]]
pattern = "lint"
interpreter = "python3"
dependencies = ["ruff==0.4.0"]
commands = ["ruff check ."]

# Map the CI axis value onto environments / 将 CI 维度值映射到环境
[ci]
axis_variable = "PYTHON_VERSION"

[ci.map]
"3.11" = ["py3.11", "lint"]
"3.12" = ["py3.12"]
"#
    )
}

/// Executes the init command.
///
/// # Arguments
/// * `output` - Path for the new configuration file
/// * `non_interactive` - Skip every prompt and write the default template
/// * `force` - Overwrite an existing file without asking
/// * `language` - Language written into the file and used for messages
pub fn execute(output: PathBuf, non_interactive: bool, force: bool, language: &str) -> Result<()> {
    if output.exists() && !force {
        if non_interactive {
            println!(
                "{}",
                t!("init.file_exists", locale = language, path = output.display()).red()
            );
            println!("{}", t!("init.use_force", locale = language).yellow());
            return Ok(());
        }

        let overwrite = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(t!("init.confirm_overwrite", locale = language, path = output.display()).to_string())
            .default(false)
            .interact()?;
        if !overwrite {
            println!("{}", t!("init.aborted", locale = language).yellow());
            return Ok(());
        }
    }

    let (envlist, command) = if non_interactive {
        (DEFAULT_ENVLIST.to_string(), DEFAULT_COMMAND.to_string())
    } else {
        let theme = ColorfulTheme::default();
        let envlist: String = Input::with_theme(&theme)
            .with_prompt(t!("init.prompt_envlist", locale = language).to_string())
            .default(DEFAULT_ENVLIST.to_string())
            .interact_text()?;
        let command: String = Input::with_theme(&theme)
            .with_prompt(t!("init.prompt_command", locale = language).to_string())
            .default(DEFAULT_COMMAND.to_string())
            .interact_text()?;
        (envlist, command)
    };

    // Create parent directories if needed
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            t!("init.create_parent_dir_failed", locale = language, path = parent.display()).to_string()
        })?;
    }

    fs::write(&output, render_config(language, &envlist, &command)).with_context(|| {
        t!("init.write_failed", locale = language, path = output.display()).to_string()
    })?;

    println!(
        "{}",
        t!("init.success", locale = language, path = output.display()).green()
    );
    println!("{}", t!("init.next_steps", locale = language));

    Ok(())
}
