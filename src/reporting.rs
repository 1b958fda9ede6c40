//! # Reporting Module / 报告模块
//!
//! This module handles the display and export of run summaries: a colorful
//! console table with internationalization support, a styled HTML report and
//! a JSON summary for machines.
//!
//! 此模块处理运行摘要的显示和导出：支持国际化的彩色控制台表格、
//! 样式化的 HTML 报告以及面向机器的 JSON 摘要。

pub mod console;
pub mod html;
pub mod json;

// Re-export common reporting functions
pub use console::{print_failure_details, print_summary};
pub use html::generate_html_report;
pub use json::write_json_report;
