//! # Engine Integration Tests / 引擎集成测试
//!
//! End-to-end tests of the engine with a scripted process executor: selection,
//! CI narrowing, parallel execution order, failure containment and cancellation.
//!
//! 使用脚本化进程执行器的引擎端到端测试：选择、CI 收窄、并行执行顺序、
//! 失败隔离和取消。

mod common;

use common::{FakeExecutor, Script, config_from};
use envmatrix::core::config::ConfigModel;
use envmatrix::core::engine::{Engine, EngineOptions, RunRequest};
use envmatrix::core::error::RunError;
use envmatrix::core::models::{FailureDetail, Status};
use envmatrix::infra::command::ProcessExecutor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

fn engine(
    dir: &TempDir,
    config: Arc<ConfigModel>,
    executor: Arc<FakeExecutor>,
    jobs: usize,
) -> Engine {
    let executor: Arc<dyn ProcessExecutor> = executor;
    let options = EngineOptions::from_config(&config, dir.path()).with_jobs(jobs);
    Engine::new(config, executor, options)
}

#[cfg(test)]
mod end_to_end_tests {
    use super::*;

    const CONFIG: &str = r#"
envlist = ["py{38,39}"]

[defaults]
commands = ["echo hello"]

[ci.map]
"3.8" = ["py38"]
"3.9" = ["py39", "docs"]
"#;

    #[tokio::test]
    async fn test_axis_selects_exactly_the_mapped_environment() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        let engine = engine(&dir, config_from(CONFIG), executor.clone(), 2);

        let summary = engine
            .run(RunRequest::new().axis("3.8"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.results().len(), 1);
        let result = &summary.results()[0];
        assert_eq!(result.name, "py38");
        assert_eq!(result.status, Status::Success);
        assert!(summary.overall_success());
        assert_eq!(executor.argvs(), vec![vec!["echo", "hello"]]);
    }

    #[tokio::test]
    async fn test_axis_with_absent_mapped_name_runs_the_rest() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        let engine = engine(&dir, config_from(CONFIG), executor.clone(), 2);

        let summary = engine
            .run(RunRequest::new().axis("3.9"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.names(), vec!["py39"]);
    }

    #[tokio::test]
    async fn test_unmapped_axis_executes_nothing() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        let engine = engine(&dir, config_from(CONFIG), executor.clone(), 2);

        let result = engine
            .run(RunRequest::new().axis("3.12"), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RunError::UnmappedAxisValue { .. })));
        assert!(executor.calls().is_empty());
        assert!(!dir.path().join(".envmatrix").exists());
    }

    #[tokio::test]
    async fn test_empty_selection_executes_nothing() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        let engine = engine(&dir, config_from(CONFIG), executor.clone(), 2);

        let result = engine
            .run(RunRequest::new().select(["py27"]), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RunError::NoEnvironmentsSelected { .. })));
        assert!(executor.calls().is_empty());
    }
}

#[cfg(test)]
mod parallel_tests {
    use super::*;

    fn delayed_config() -> Arc<ConfigModel> {
        // Each environment runs a single command whose argv names the environment.
        let mut text = String::from(
            "envlist = [\"e{1,2,3,4,5,6}\"]\n[defaults]\nisolate = false\ncommands = [\"true\"]\n",
        );
        for i in 1..=6 {
            text.push_str(&format!("[[env]]\npattern = \"e{i}\"\ncommands = [[\"work\", \"e{i}\"]]\n"));
        }
        config_from(&text)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_summary_is_in_spec_order_despite_completion_order() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        // Earlier environments take longer, so they finish last.
        for i in 1..=6u64 {
            executor.script(
                &format!("work e{i}"),
                Script::delayed(0, Duration::from_millis(20 * (7 - i))),
            );
        }
        let engine = engine(&dir, delayed_config(), executor.clone(), 6);

        let summary = engine
            .run(RunRequest::new(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.names(), vec!["e1", "e2", "e3", "e4", "e5", "e6"]);
        assert!(summary.overall_success());
        assert_eq!(executor.calls().len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_is_contained_to_its_environment() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        executor.script("work e3", Script::exit(7));
        let engine = engine(&dir, delayed_config(), executor.clone(), 3);

        let summary = engine
            .run(RunRequest::new(), CancellationToken::new())
            .await
            .unwrap();

        assert!(!summary.overall_success());
        assert_eq!(summary.count(Status::Success), 5);
        let failed = summary.get("e3").unwrap();
        assert_eq!(failed.status, Status::Failed);
        assert_eq!(failed.exit_code, Some(7));
        assert_eq!(executor.calls().len(), 6);
    }
}

#[cfg(test)]
mod provisioning_tests {
    use super::*;

    const CONFIG: &str = r#"
envlist = ["good", "bad"]

[defaults]
dependencies = ["pkg==1.0"]
installer = ["fake-pip", "install", "--prefix", "{envdir}"]
commands = ["run-tests"]

[[env]]
pattern = "bad"
dependencies = ["broken==0.0.0"]
"#;

    #[tokio::test]
    async fn test_provision_failure_is_scoped_to_one_environment() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        let bad_install = format!(
            "fake-pip install --prefix {} broken==0.0.0",
            dir.path().join(".envmatrix/envs/bad").display()
        );
        executor.script(&bad_install, Script::exit(1));
        let engine = engine(&dir, config_from(CONFIG), executor.clone(), 2);

        let summary = engine
            .run(RunRequest::new(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.get("good").unwrap().status, Status::Success);
        let bad = summary.get("bad").unwrap();
        assert_eq!(bad.status, Status::Failed);
        assert_eq!(bad.exit_code, None);
        assert!(matches!(bad.failure, Some(FailureDetail::Provision { .. })));
        assert!(executor.calls_for("bad").iter().all(|c| c.argv[0] == "fake-pip"));
    }

    #[tokio::test]
    async fn test_second_run_reuses_cached_contexts() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        let config = config_from(CONFIG);

        for _ in 0..2 {
            let engine = engine(&dir, Arc::clone(&config), executor.clone(), 2);
            let summary = engine
                .run(RunRequest::new(), CancellationToken::new())
                .await
                .unwrap();
            assert!(summary.overall_success());
        }

        assert_eq!(executor.calls_to("fake-pip").len(), 2);
        assert_eq!(executor.calls_to("run-tests").len(), 4);
    }

    #[tokio::test]
    async fn test_keep_failed_retains_temporary_context() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        executor.script("run-tests", Script::exit(1));
        let config = config_from(&format!("cache = false\nkeep_failed = true\n{CONFIG}"));
        let engine = engine(&dir, config, executor.clone(), 2);

        let summary = engine
            .run(RunRequest::new().select(["good"]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.get("good").unwrap().status, Status::Failed);
        assert!(dir.path().join(".envmatrix/failed/good").is_dir());
    }
}

#[cfg(test)]
mod request_tests {
    use super::*;

    const CONFIG: &str = r#"
envlist = ["unit"]

[defaults]
isolate = false
commands = ["prepare", "pytest"]
"#;

    #[tokio::test]
    async fn test_passthrough_and_overrides_reach_commands() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        let engine = engine(&dir, config_from(CONFIG), executor.clone(), 1);

        let request = RunRequest::new()
            .passthrough(["-k", "fast"])
            .env_override("CI", "1");
        engine.run(request, CancellationToken::new()).await.unwrap();

        assert_eq!(
            executor.argvs(),
            vec![vec!["prepare"], vec!["pytest", "-k", "fast"]]
        );
        assert!(
            executor
                .calls()
                .iter()
                .all(|c| c.invocation.env.get("CI").map(String::as_str) == Some("1"))
        );
    }
}

#[cfg(test)]
mod cancellation_tests {
    use super::*;

    const CONFIG: &str = r#"
envlist = ["slow{1,2,3,4}"]

[defaults]
isolate = false
commands = ["sleepy", "after"]
"#;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_marks_running_and_pending_environments_cancelled() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        executor.script("sleepy", Script::delayed(0, Duration::from_secs(30)));
        // Two workers: two environments are running, two are pending.
        let engine = engine(&dir, config_from(CONFIG), executor.clone(), 2);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            engine.run(RunRequest::new(), cancel),
        )
        .await
        .expect("run should stop promptly after cancellation")
        .unwrap();

        assert_eq!(summary.names(), vec!["slow1", "slow2", "slow3", "slow4"]);
        assert_eq!(summary.count(Status::Cancelled), 4);
        assert!(!summary.overall_success());
        assert!(executor.calls_to("after").is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_run_executes_nothing() {
        let dir = tempdir().unwrap();
        let executor = FakeExecutor::new();
        let engine = engine(&dir, config_from(CONFIG), executor.clone(), 2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = engine.run(RunRequest::new(), cancel).await.unwrap();

        assert_eq!(summary.count(Status::Cancelled), 4);
        assert!(executor.calls().is_empty());
    }
}
