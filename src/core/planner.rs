//! # Execution Planner Module / 执行计划模块
//!
//! Selects the environments for one invocation: the default envlist or the
//! caller's selectors, optionally narrowed by a CI axis value. All selection
//! failures are raised here, before anything is provisioned.
//!
//! 为一次调用选择环境：默认的 envlist 或调用者的选择器，并可根据 CI 维度值收窄。
//! 所有选择失败都在此处抛出，早于任何环境准备。

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::bridge::CiMatrixBridge;
use crate::core::config::ConfigModel;
use crate::core::error::{ConfigError, RunError};
use crate::core::expander::parse_pattern;
use crate::core::models::EnvironmentSpec;

/// Selector keyword matching every known environment.
pub const SELECT_ALL: &str = "ALL";

/// Represents the environments chosen for one run.
/// 表示为一次运行选择的环境。
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// The selected specs, in spec order.
    /// 已选择的规格，按规格顺序排列。
    pub specs: Vec<Arc<EnvironmentSpec>>,
    /// Names produced by selectors that match no known environment.
    /// 选择器产生但不匹配任何已知环境的名称。
    pub unknown_names: Vec<String>,
    /// The CI axis value used for narrowing, if any.
    /// 用于收窄的 CI 维度值（如有）。
    pub axis: Option<String>,
}

impl ExecutionPlan {
    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name().to_string()).collect()
    }
}

/// Splits a raw `-e` value on commas that are not inside a brace group, so
/// `py{38,39},lint` yields `["py{38,39}", "lint"]`.
///
/// 按不在花括号分组内的逗号拆分原始 `-e` 值。
pub fn split_selectors(raw: &str) -> Vec<String> {
    let mut selectors = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in raw.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    selectors.push(trimmed.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        selectors.push(trimmed.to_string());
    }
    selectors
}

/// Creates an execution plan.
///
/// * `selectors` - `None` selects the default envlist; otherwise each entry is a
///   brace pattern or `ALL`.
/// * `axis` - optional CI axis value, narrowing the selection through the
///   configured mapping.
///
/// 创建执行计划。
pub fn plan_execution(
    config: &ConfigModel,
    selectors: Option<&[String]>,
    axis: Option<&str>,
) -> Result<ExecutionPlan, RunError> {
    let bridge = CiMatrixBridge::new(config.ci());
    if let Some(axis) = axis {
        // An unmapped axis value signals CI/config drift and wins over any
        // other selection problem.
        bridge.resolve(axis)?;
    }

    let mut unknown_names = Vec::new();

    let selected: Vec<Arc<EnvironmentSpec>> = match selectors {
        None => {
            let defaults: HashSet<&str> = config.default_selection().into_iter().collect();
            config
                .specs()
                .iter()
                .filter(|spec| defaults.contains(spec.name()))
                .cloned()
                .collect()
        }
        Some(selectors) if selectors.iter().any(|s| s == SELECT_ALL) => config.specs().to_vec(),
        Some(selectors) => {
            let mut wanted = HashSet::new();
            for selector in selectors {
                let pattern =
                    parse_pattern(selector).map_err(|reason| ConfigError::MalformedPattern {
                        pattern: selector.clone(),
                        reason,
                    })?;
                for name in pattern.expand_names() {
                    if config.spec(&name).is_none() {
                        tracing::warn!(selector = %selector, environment = %name, "unknown environment");
                        unknown_names.push(name.clone());
                    }
                    wanted.insert(name);
                }
            }
            config
                .specs()
                .iter()
                .filter(|spec| wanted.contains(spec.name()))
                .cloned()
                .collect()
        }
    };

    let described = selectors.map(<[String]>::to_vec).unwrap_or_default();
    if selected.is_empty() {
        return Err(RunError::NoEnvironmentsSelected {
            selectors: described,
        });
    }

    let specs = match axis {
        Some(axis) => bridge.narrow(&selected, axis)?,
        None => selected,
    };

    Ok(ExecutionPlan {
        specs,
        unknown_names,
        axis: axis.map(str::to_string),
    })
}
