//! # Provision Module Unit Tests / Provision 模块单元测试
//!
//! Tests for context provisioning: install roots, installer invocation,
//! content-hash reuse across runs and deduplication of concurrent acquires.
//!
//! 上下文准备的测试：安装根目录、安装器调用、跨运行的内容哈希复用以及并发获取的去重。

mod common;

use common::{FakeExecutor, Script, config_from};
use envmatrix::core::error::ProvisionError;
use envmatrix::core::provision::{
    ENV_DIR_VAR, ENV_NAME_VAR, EnvironmentProvisioner, ProvisionPolicy, STATE_FILE,
    installer_argv,
};
use envmatrix::infra::command::ProcessExecutor;
use std::ffi::OsString;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

fn config_with_deps(deps: &[&str]) -> String {
    let deps = deps
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"
envlist = ["py38", "py39"]
[defaults]
dependencies = [{deps}]
installer = ["fake-pip", "install", "--prefix", "{{envdir}}"]
commands = ["echo hello"]
"#
    )
}

fn provisioner(dir: &TempDir, executor: Arc<FakeExecutor>, policy: ProvisionPolicy) -> EnvironmentProvisioner {
    let executor: Arc<dyn ProcessExecutor> = executor;
    EnvironmentProvisioner::new(dir.path(), dir.path().join(".envmatrix"), executor, policy)
}

#[tokio::test]
async fn test_installer_receives_exact_dependency_list() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    let config = config_from(&config_with_deps(&["pytest==8.2.0", "attrs==23.1.0"]));
    let spec = config.spec("py38").unwrap();
    let prov = provisioner(&dir, executor.clone(), ProvisionPolicy::default());

    let ctx = prov.acquire(spec, None, &CancellationToken::new()).await.unwrap();

    let root = dir.path().join(".envmatrix").join("envs").join("py38");
    assert_eq!(ctx.root(), Some(root.as_path()));
    assert!(!ctx.reused());
    assert!(root.join(STATE_FILE).exists());
    assert!(root.join("bin").is_dir());

    let installs = executor.calls_to("fake-pip");
    assert_eq!(installs.len(), 1);
    assert_eq!(
        installs[0].argv,
        vec![
            "fake-pip".to_string(),
            "install".to_string(),
            "--prefix".to_string(),
            root.to_string_lossy().into_owned(),
            "pytest==8.2.0".to_string(),
            "attrs==23.1.0".to_string(),
        ]
    );
    assert_eq!(installs[0].invocation.cwd, dir.path());
    assert_eq!(ctx.env().get(ENV_NAME_VAR).map(String::as_str), Some("py38"));
    assert_eq!(
        ctx.env().get(ENV_DIR_VAR).cloned(),
        Some(root.to_string_lossy().into_owned())
    );
}

#[tokio::test]
async fn test_unchanged_dependencies_do_not_reinstall_across_runs() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    let config = config_from(&config_with_deps(&["pytest==8.2.0"]));
    let spec = config.spec("py38").unwrap();

    let first = provisioner(&dir, executor.clone(), ProvisionPolicy::default());
    first.acquire(spec, None, &CancellationToken::new()).await.unwrap();

    // A fresh provisioner models the next run.
    let second = provisioner(&dir, executor.clone(), ProvisionPolicy::default());
    let ctx = second.acquire(spec, None, &CancellationToken::new()).await.unwrap();

    assert!(ctx.reused());
    assert_eq!(executor.calls_to("fake-pip").len(), 1);
    assert_eq!(second.install_count(), 0);
}

#[tokio::test]
async fn test_changed_dependencies_rebuild_the_context() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();

    let old = config_from(&config_with_deps(&["pytest==8.2.0"]));
    provisioner(&dir, executor.clone(), ProvisionPolicy::default())
        .acquire(old.spec("py38").unwrap(), None, &CancellationToken::new())
        .await
        .unwrap();

    let root = dir.path().join(".envmatrix/envs/py38");
    std::fs::write(root.join("stale.txt"), "left over").unwrap();

    let new = config_from(&config_with_deps(&["pytest==8.3.0"]));
    let ctx = provisioner(&dir, executor.clone(), ProvisionPolicy::default())
        .acquire(new.spec("py38").unwrap(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!ctx.reused());
    assert_eq!(executor.calls_to("fake-pip").len(), 2);
    assert!(!root.join("stale.txt").exists());
}

#[tokio::test]
async fn test_recreate_forces_a_rebuild() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    let config = config_from(&config_with_deps(&["pytest==8.2.0"]));
    let spec = config.spec("py38").unwrap();

    provisioner(&dir, executor.clone(), ProvisionPolicy::default())
        .acquire(spec, None, &CancellationToken::new())
        .await
        .unwrap();
    let policy = ProvisionPolicy {
        cache: true,
        recreate: true,
    };
    provisioner(&dir, executor.clone(), policy)
        .acquire(spec, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(executor.calls_to("fake-pip").len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_install_once() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    executor.script(
        "fake-pip",
        Script::delayed(0, std::time::Duration::from_millis(50)),
    );
    let config = config_from(&config_with_deps(&["pytest==8.2.0"]));
    let spec = Arc::clone(config.spec("py38").unwrap());
    let prov = Arc::new(provisioner(&dir, executor.clone(), ProvisionPolicy::default()));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let prov = Arc::clone(&prov);
        let spec = Arc::clone(&spec);
        handles.push(tokio::spawn(async move {
            prov.acquire(&spec, None, &CancellationToken::new()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(executor.calls_to("fake-pip").len(), 1);
    assert_eq!(prov.install_count(), 1);
}

#[tokio::test]
async fn test_distinct_specs_get_disjoint_roots() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    let config = config_from(&config_with_deps(&["pytest==8.2.0"]));
    let prov = provisioner(&dir, executor.clone(), ProvisionPolicy::default());
    let cancel = CancellationToken::new();

    let a = prov.acquire(config.spec("py38").unwrap(), None, &cancel).await.unwrap();
    let b = prov.acquire(config.spec("py39").unwrap(), None, &cancel).await.unwrap();

    assert_ne!(a.root(), b.root());
    assert_eq!(executor.calls_to("fake-pip").len(), 2);
}

#[tokio::test]
async fn test_failed_install_reports_exit_code() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    executor.script("fake-pip", Script::exit(3));
    let config = config_from(&config_with_deps(&["broken==0.0.0"]));
    let prov = provisioner(&dir, executor.clone(), ProvisionPolicy::default());

    let result = prov
        .acquire(config.spec("py38").unwrap(), None, &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(ProvisionError::DependencyInstallFailed { exit_code: Some(3) })
    ));

    // No state was recorded, so the next attempt installs again.
    executor.script("fake-pip", Script::ok("installed"));
    let prov = provisioner(&dir, executor.clone(), ProvisionPolicy::default());
    let ctx = prov
        .acquire(config.spec("py38").unwrap(), None, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!ctx.reused());
}

#[tokio::test]
async fn test_no_dependencies_means_no_installer_call() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    let config = config_from(&config_with_deps(&[]));
    let prov = provisioner(&dir, executor.clone(), ProvisionPolicy::default());

    let ctx = prov
        .acquire(config.spec("py38").unwrap(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(ctx.root().is_some());
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_uncached_contexts_are_temporary() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    let config = config_from(&config_with_deps(&["pytest==8.2.0"]));
    let policy = ProvisionPolicy {
        cache: false,
        recreate: false,
    };

    let root = {
        let prov = provisioner(&dir, executor.clone(), policy);
        let ctx = prov
            .acquire(config.spec("py38").unwrap(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(ctx.is_temporary());
        let root = ctx.root().unwrap().to_path_buf();
        assert!(root.starts_with(dir.path().join(".envmatrix").join("tmp")));
        assert!(root.exists());
        root
    };

    assert!(!root.exists());
}

#[tokio::test]
async fn test_missing_interpreter_is_reported() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    let config = config_from(
        r#"
envlist = ["py{38}"]
[defaults]
interpreter = "python{0}-does-not-exist"
commands = ["echo hello"]
"#,
    );
    let prov = provisioner(&dir, executor.clone(), ProvisionPolicy::default())
        .with_search_path(Some(OsString::from(dir.path())));

    let result = prov
        .acquire(config.spec("py38").unwrap(), None, &CancellationToken::new())
        .await;
    match result {
        Err(ProvisionError::InterpreterNotFound { selector }) => {
            assert_eq!(selector, "python38-does-not-exist");
        }
        other => panic!("expected InterpreterNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_install_is_cancelled() {
    let dir = tempdir().unwrap();
    let executor = FakeExecutor::new();
    executor.script(
        "fake-pip",
        Script::delayed(0, std::time::Duration::from_secs(30)),
    );
    let config = config_from(&config_with_deps(&["pytest==8.2.0"]));
    let prov = provisioner(&dir, executor.clone(), ProvisionPolicy::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = prov.acquire(config.spec("py38").unwrap(), None, &cancel).await;
    assert!(matches!(result, Err(ProvisionError::Cancelled)));
}

#[test]
fn test_installer_argv_substitutes_placeholders() {
    let config = config_from(
        r#"
envlist = ["a"]
[defaults]
dependencies = ["x==1"]
installer = ["{interpreter}", "-m", "pip", "install", "--target", "{envdir}/lib"]
commands = ["true"]
"#,
    );
    let argv = installer_argv(
        config.spec("a").unwrap(),
        std::path::Path::new("/envs/a"),
        Some(std::path::Path::new("/usr/bin/python3")),
    );
    assert_eq!(
        argv,
        vec!["/usr/bin/python3", "-m", "pip", "install", "--target", "/envs/a/lib", "x==1"]
    );
}
