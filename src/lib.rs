//! # envmatrix Library / envmatrix 库
//!
//! This library provides the core functionality for the envmatrix tool, a
//! configuration-driven orchestrator that expands a factored environment
//! matrix, provisions an isolated context per environment and runs each
//! environment's commands with per-environment fail-fast semantics.
//!
//! 此库为 envmatrix 工具提供核心功能。这是一个配置驱动的编排器，它展开带因子的
//! 环境矩阵，为每个环境准备隔离的上下文，并以每个环境独立的快速失败语义运行命令。
//!
//! ## Modules / 模块
//!
//! - `core` - Configuration, matrix expansion, provisioning and the run engine
//! - `infra` - Infrastructure services like process execution, file system operations and hashing
//! - `reporting` - Console, HTML and JSON reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 配置、矩阵展开、环境准备和运行引擎
//! - `infra` - 基础设施服务，如进程执行、文件系统操作和哈希
//! - `reporting` - 控制台、HTML 和 JSON 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::models;
pub use core::{Engine, EngineOptions, RunRequest};

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");

/// Detects the best matching locale for the user's system.
///
/// It attempts to match the full locale (e.g., "zh-CN"), then just the
/// language code (e.g., "en"), and finally falls back to "en".
pub fn detect_locale() -> String {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    if available_locales.contains(&locale.as_str()) {
        return locale;
    }
    locale
        .split('-')
        .next()
        .filter(|lang_code| available_locales.contains(lang_code))
        .unwrap_or("en")
        .to_string()
}
