//! # Core Module / 核心模块
//!
//! This module contains the core functionality of envmatrix: the data models,
//! configuration, matrix expansion, CI narrowing, provisioning, command
//! execution and result aggregation.
//!
//! 此模块包含 envmatrix 的核心功能：数据模型、配置、矩阵展开、CI 收窄、
//! 环境准备、命令执行和结果聚合。

pub mod aggregator;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod expander;
pub mod models;
pub mod planner;
pub mod provision;

// Re-exports
pub use config::{ConfigModel, load_config};
pub use engine::{Engine, EngineOptions, RunRequest};
pub use error::{ConfigError, PatternError, ProvisionError, RunError};
pub use models::{EnvironmentSpec, ExecutionResult, RunSummary, Status};
