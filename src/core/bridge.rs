//! # CI Matrix Bridge / CI 矩阵桥接
//!
//! Maps a single external CI axis value (for example an interpreter version
//! exported by the CI provider) onto the set of environments relevant to the
//! current invocation, and narrows the expanded matrix accordingly.
//! The mapping is treated as authoritative data: no uniform rule is inferred
//! from it, so one value may target several environments while another
//! targets a single one.
//!
//! 将单个外部 CI 维度值（例如 CI 提供的解释器版本）映射到当前调用相关的环境集合，
//! 并据此收窄已展开的矩阵。映射被视为权威数据，不会从中推断统一规则。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::{ConfigError, RunError};
use crate::core::models::EnvironmentSpec;

/// Axis value -> non-empty, ordered list of environment names.
/// 维度值 -> 非空、有序的环境名称列表。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiAxisMapping {
    entries: BTreeMap<String, Vec<String>>,
}

impl CiAxisMapping {
    /// Builds a mapping, rejecting any value that maps to no environment.
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        if let Some((value, _)) = entries.iter().find(|(_, names)| names.is_empty()) {
            return Err(ConfigError::EmptyAxisMapping {
                value: value.clone(),
            });
        }
        Ok(Self { entries })
    }

    pub fn get(&self, value: &str) -> Option<&[String]> {
        self.entries.get(value).map(Vec::as_slice)
    }

    /// Every axis value in the mapping's domain, sorted.
    pub fn values(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }
}

/// Narrows a matrix to the environments mapped from one axis value.
/// 将矩阵收窄到某个维度值所映射的环境。
#[derive(Debug, Clone, Copy)]
pub struct CiMatrixBridge<'a> {
    mapping: &'a CiAxisMapping,
}

impl<'a> CiMatrixBridge<'a> {
    pub fn new(mapping: &'a CiAxisMapping) -> Self {
        Self { mapping }
    }

    /// Returns exactly the mapped set for `axis`.
    /// An unknown value is a hard error: silently mapping it to nothing would
    /// let a pipeline report success without running any check.
    ///
    /// 返回 `axis` 映射的确切集合。未知值是硬错误。
    pub fn resolve(&self, axis: &str) -> Result<&'a [String], RunError> {
        self.mapping
            .get(axis)
            .ok_or_else(|| RunError::UnmappedAxisValue {
                value: axis.to_string(),
                known: self.mapping.values(),
            })
    }

    /// Keeps the specs whose names are mapped from `axis`, preserving spec order.
    /// Mapped names absent from `specs` are reported and skipped; an empty
    /// result is `NoEnvironmentsSelected`.
    ///
    /// 保留名称由 `axis` 映射的规格，并保持规格顺序。
    pub fn narrow(
        &self,
        specs: &[Arc<EnvironmentSpec>],
        axis: &str,
    ) -> Result<Vec<Arc<EnvironmentSpec>>, RunError> {
        let targets = self.resolve(axis)?;

        for target in targets {
            if !specs.iter().any(|spec| spec.name() == target) {
                tracing::warn!(
                    axis,
                    environment = %target,
                    "CI axis maps to an environment that is not part of this selection"
                );
            }
        }

        let narrowed: Vec<_> = specs
            .iter()
            .filter(|spec| targets.iter().any(|t| t == spec.name()))
            .cloned()
            .collect();

        if narrowed.is_empty() {
            return Err(RunError::NoEnvironmentsSelected {
                selectors: vec![format!("axis={axis}")],
            });
        }

        tracing::info!(
            axis,
            selected = ?narrowed.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "narrowed matrix by CI axis"
        );
        Ok(narrowed)
    }
}
