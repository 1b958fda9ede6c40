//! # List Command Module / 列表命令模块
//!
//! Prints the known environments in spec order. Environments in the envlist
//! (the default selection) are marked with `*`. With an axis value only the
//! environments the CI mapping selects are shown.
//!
//! 按规格顺序打印已知环境。envlist 中的环境（默认选择）标记为 `*`。
//! 指定维度值时只显示 CI 映射所选择的环境。

use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;

use crate::core::bridge::CiMatrixBridge;
use crate::core::config::load_config;
use crate::infra::command::display_argv;
use crate::infra::fs::absolute_path;
use crate::infra::t;

pub fn execute(
    config: PathBuf,
    project_dir: PathBuf,
    axis: Option<String>,
    locale: &str,
) -> Result<()> {
    let project_root = absolute_path(&project_dir).with_context(|| {
        t!("run.project_dir_not_found", locale = locale, path = project_dir.display()).to_string()
    })?;
    let config_path = if config.is_absolute() {
        config
    } else {
        project_root.join(config)
    };
    let model = load_config(&config_path).with_context(|| {
        t!("run.config_load_failed", locale = locale, path = config_path.display()).to_string()
    })?;

    let specs = match axis.as_deref().filter(|a| !a.trim().is_empty()) {
        Some(axis) => {
            println!("{}", t!("run.axis_value", locale = locale, axis = axis).cyan());
            CiMatrixBridge::new(model.ci()).narrow(model.specs(), axis)?
        }
        None => model.specs().to_vec(),
    };

    println!("{}", t!("list.header", locale = locale).bold());
    for spec in &specs {
        let marker = if model.is_default(spec.name()) { "*" } else { " " };
        let commands = spec
            .commands()
            .iter()
            .map(|argv| display_argv(argv))
            .collect::<Vec<_>>()
            .join(" && ");
        println!(
            " {} {:<24} {}",
            marker.green(),
            spec.name().cyan(),
            commands.dimmed()
        );
    }
    println!("\n{}", t!("list.legend", locale = locale).dimmed());

    Ok(())
}
