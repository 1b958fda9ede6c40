//! # I18n Unit Tests / I18n 单元测试
//!
//! This module tests localized status strings, the English fallback and
//! locale detection.
//!
//! 此模块测试本地化状态字符串、英文回退和语言检测。

use chrono::Utc;
use envmatrix::core::models::{ExecutionResult, FailureDetail};
use envmatrix::detect_locale;
use std::time::Duration;

fn timeout_result() -> ExecutionResult {
    ExecutionResult::failed(
        "slow",
        FailureDetail::Timeout {
            index: 0,
            argv: vec!["sleep".to_string()],
            timeout_secs: 1,
        },
        String::new(),
        Duration::from_secs(1),
        Utc::now(),
    )
}

#[cfg(test)]
mod status_tests {
    use super::*;

    #[test]
    fn test_status_strings_are_localized() {
        let ok = ExecutionResult::success("a", String::new(), Duration::ZERO, Utc::now());
        assert_eq!(ok.get_status_str("en"), "Passed");
        assert_eq!(ok.get_status_str("zh-CN"), "通过");

        let slow = timeout_result();
        assert_eq!(slow.get_status_str("en"), "Timeout");
        assert_eq!(slow.get_status_str("zh-CN"), "超时");
        assert_eq!(slow.get_status_class(), "status-timeout");

        let cancelled = ExecutionResult::cancelled("c", String::new(), Duration::ZERO, Utc::now());
        assert_eq!(cancelled.get_status_str("zh-CN"), "已取消");
    }

    #[test]
    fn test_unknown_locale_falls_back_to_english() {
        let ok = ExecutionResult::success("a", String::new(), Duration::ZERO, Utc::now());
        assert_eq!(ok.get_status_str("fr"), "Passed");
    }
}

#[cfg(test)]
mod locale_detection_tests {
    use super::*;

    #[test]
    fn test_detected_locale_is_available() {
        let locale = detect_locale();
        assert!(
            ["en", "zh-CN"].contains(&locale.as_str()),
            "unexpected locale {locale}"
        );
    }
}
