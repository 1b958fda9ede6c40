//! # Environment Provisioner Module / 环境准备模块
//!
//! Materializes an isolated execution context for each environment spec:
//! resolves the interpreter, creates an install root that no other spec
//! shares, and delegates dependency installation to the installer
//! collaborator. Cached roots are reused only while the dependency content
//! hash is unchanged, and a per-environment lock guarantees the installer
//! never runs twice concurrently for the same spec.
//!
//! 为每个环境规格构建一个隔离的执行上下文：解析解释器，创建不与其他规格共享的
//! 安装根目录，并将依赖安装委托给安装器协作者。仅当依赖内容哈希未变化时才复用缓存的
//! 根目录，每个环境的锁保证安装器不会为同一规格并发运行两次。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::core::error::ProvisionError;
use crate::core::models::EnvironmentSpec;
use crate::infra::command::{Invocation, LiveSink, ProcessExecutor, Termination};
use crate::infra::fs::{find_executable, recreate_dir, tempdir_in};
use crate::infra::hash::{dependency_digest, short};

/// Name of the state file recorded in every cached install root.
pub const STATE_FILE: &str = ".envmatrix-state.json";

/// Variables exported to every command of an environment.
pub const ENV_NAME_VAR: &str = "ENVMATRIX_ENV_NAME";
pub const ENV_DIR_VAR: &str = "ENVMATRIX_ENV_DIR";
pub const INTERPRETER_VAR: &str = "ENVMATRIX_INTERPRETER";

/// How contexts are kept between runs.
/// 上下文在运行之间的保留方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionPolicy {
    /// Keep install roots under the work directory and reuse them across runs.
    pub cache: bool,
    /// Rebuild cached roots even when their hash is unchanged.
    pub recreate: bool,
}

impl Default for ProvisionPolicy {
    fn default() -> Self {
        Self {
            cache: true,
            recreate: false,
        }
    }
}

/// What was recorded about a cached install root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ContextState {
    digest: String,
    dependencies: Vec<String>,
    interpreter: Option<PathBuf>,
    created_at: DateTime<Utc>,
}

/// An isolated execution context for one environment.
/// Cheap to clone; an uncached root is deleted when the last clone is dropped.
///
/// 单个环境的隔离执行上下文。
/// 克隆开销很小；未缓存的根目录会在最后一个克隆被丢弃时删除。
#[derive(Debug, Clone)]
pub struct Context {
    name: String,
    root: Option<PathBuf>,
    interpreter: Option<PathBuf>,
    env: BTreeMap<String, String>,
    digest: String,
    reused: bool,
    _temp: Option<Arc<TempDir>>,
}

impl Context {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The exclusively owned install root. `None` for non-isolated environments.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn interpreter(&self) -> Option<&Path> {
        self.interpreter.as_deref()
    }

    /// Variables to apply on top of the host environment for every command.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Whether an existing root was reused without running the installer.
    pub fn reused(&self) -> bool {
        self.reused
    }

    /// Whether the root is removed at the end of the run.
    pub fn is_temporary(&self) -> bool {
        self._temp.is_some()
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<Context>>>;

/// Creates and caches execution contexts.
/// 创建并缓存执行上下文。
pub struct EnvironmentProvisioner {
    project_root: PathBuf,
    work_dir: PathBuf,
    executor: Arc<dyn ProcessExecutor>,
    policy: ProvisionPolicy,
    search_path: Option<OsString>,
    slots: Mutex<HashMap<String, Slot>>,
    installs: AtomicUsize,
}

impl EnvironmentProvisioner {
    /// # Arguments
    /// * `project_root` - Working directory for the installer
    /// * `work_dir` - Directory holding `envs/` (cached roots) and `tmp/` (uncached roots)
    /// * `executor` - The collaborator running the installer
    pub fn new(
        project_root: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        executor: Arc<dyn ProcessExecutor>,
        policy: ProvisionPolicy,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            work_dir: work_dir.into(),
            executor,
            policy,
            search_path: std::env::var_os("PATH"),
            slots: Mutex::new(HashMap::new()),
            installs: AtomicUsize::new(0),
        }
    }

    /// Overrides the search path used to resolve interpreter selectors.
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Number of installer invocations made by this provisioner.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    /// The cached install root for an environment name.
    pub fn cached_root(&self, name: &str) -> PathBuf {
        self.work_dir.join("envs").join(name)
    }

    fn slot(&self, name: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    /// Returns a context for `spec`, provisioning it if needed.
    ///
    /// A context already provisioned in this process, or a cached root whose
    /// recorded hash matches, is reused without invoking the installer.
    /// Otherwise the root is rebuilt from scratch.
    ///
    /// 返回 `spec` 的上下文，必要时进行准备。
    pub async fn acquire(
        &self,
        spec: &EnvironmentSpec,
        sink: Option<&LiveSink>,
        cancel: &CancellationToken,
    ) -> Result<Context, ProvisionError> {
        let interpreter = self.resolve_interpreter(spec)?;

        if !spec.isolate() {
            tracing::debug!(env = %spec.name(), "environment is not isolated, using host context");
            return Ok(Context {
                name: spec.name().to_string(),
                root: None,
                env: context_env(spec, None, interpreter.as_deref(), self.search_path.as_ref()),
                interpreter,
                digest: String::new(),
                reused: true,
                _temp: None,
            });
        }

        let digest = dependency_digest(spec.dependencies(), interpreter.as_deref(), spec.installer());

        // Holding the slot for the whole provisioning serializes concurrent
        // acquires of the same environment.
        let slot = self.slot(spec.name());
        let mut guard = slot.lock().await;

        if let Some(existing) = guard.as_ref().filter(|ctx| ctx.digest == digest) {
            tracing::debug!(env = %spec.name(), digest = short(&digest), "reusing context from this run");
            let mut ctx = existing.clone();
            ctx.reused = true;
            return Ok(ctx);
        }

        let ctx = if self.policy.cache {
            self.provision_cached(spec, interpreter, digest, sink, cancel).await?
        } else {
            self.provision_temporary(spec, interpreter, digest, sink, cancel).await?
        };

        *guard = Some(ctx.clone());
        Ok(ctx)
    }

    fn resolve_interpreter(&self, spec: &EnvironmentSpec) -> Result<Option<PathBuf>, ProvisionError> {
        match spec.interpreter() {
            None => Ok(None),
            Some(selector) => find_executable(selector, self.search_path.as_deref())
                .map(Some)
                .ok_or_else(|| ProvisionError::InterpreterNotFound {
                    selector: selector.to_string(),
                }),
        }
    }

    async fn provision_cached(
        &self,
        spec: &EnvironmentSpec,
        interpreter: Option<PathBuf>,
        digest: String,
        sink: Option<&LiveSink>,
        cancel: &CancellationToken,
    ) -> Result<Context, ProvisionError> {
        let root = self.cached_root(spec.name());
        let env = context_env(spec, Some(&root), interpreter.as_deref(), self.search_path.as_ref());

        let recorded = read_state(&root)?;
        let unchanged = recorded.as_ref().is_some_and(|state| state.digest == digest);

        if unchanged && !self.policy.recreate {
            tracing::info!(env = %spec.name(), digest = short(&digest), "dependencies unchanged, reusing cached context");
            return Ok(Context {
                name: spec.name().to_string(),
                root: Some(root),
                interpreter,
                env,
                digest,
                reused: true,
                _temp: None,
            });
        }

        tracing::info!(
            env = %spec.name(),
            digest = short(&digest),
            previous = ?recorded.as_ref().map(|s| short(&s.digest).to_string()),
            "building context from scratch"
        );
        recreate_dir(&root.join("bin")).map_err(|source| io_error(&root, source))?;
        // Wipe everything else from a previous build as well.
        clear_except_bin(&root)?;

        self.install(spec, &root, interpreter.as_deref(), &env, sink, cancel)
            .await?;
        write_state(&root, &digest, spec.dependencies(), interpreter.as_deref())?;

        Ok(Context {
            name: spec.name().to_string(),
            root: Some(root),
            interpreter,
            env,
            digest,
            reused: false,
            _temp: None,
        })
    }

    async fn provision_temporary(
        &self,
        spec: &EnvironmentSpec,
        interpreter: Option<PathBuf>,
        digest: String,
        sink: Option<&LiveSink>,
        cancel: &CancellationToken,
    ) -> Result<Context, ProvisionError> {
        let parent = self.work_dir.join("tmp");
        let temp = tempdir_in(&parent, spec.name()).map_err(|source| io_error(&parent, source))?;
        let root = temp.path().to_path_buf();
        std::fs::create_dir_all(root.join("bin")).map_err(|source| io_error(&root, source))?;

        let env = context_env(spec, Some(&root), interpreter.as_deref(), self.search_path.as_ref());
        self.install(spec, &root, interpreter.as_deref(), &env, sink, cancel)
            .await?;

        Ok(Context {
            name: spec.name().to_string(),
            root: Some(root),
            interpreter,
            env,
            digest,
            reused: false,
            _temp: Some(Arc::new(temp)),
        })
    }

    /// Runs the installer with the exact pinned dependency list. Only the exit
    /// code is inspected.
    async fn install(
        &self,
        spec: &EnvironmentSpec,
        root: &Path,
        interpreter: Option<&Path>,
        env: &BTreeMap<String, String>,
        sink: Option<&LiveSink>,
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError> {
        if spec.dependencies().is_empty() {
            return Ok(());
        }

        let argv = installer_argv(spec, root, interpreter);
        let invocation = Invocation::new(argv, &self.project_root).with_env(env.clone());

        tracing::info!(env = %spec.name(), command = %invocation.display(), "installing dependencies");
        self.installs.fetch_add(1, Ordering::SeqCst);

        let outcome = self
            .executor
            .execute(&invocation, sink, cancel)
            .await
            .map_err(|e| ProvisionError::InstallerSpawn {
                message: e.to_string(),
            })?;

        match outcome.termination {
            Termination::Exited(Some(0)) => Ok(()),
            Termination::Exited(exit_code) => Err(ProvisionError::DependencyInstallFailed { exit_code }),
            Termination::TimedOut => Err(ProvisionError::DependencyInstallFailed { exit_code: None }),
            Termination::Cancelled => Err(ProvisionError::Cancelled),
        }
    }
}

/// The installer template with `{envdir}` / `{interpreter}` substituted,
/// followed by the dependency list.
pub fn installer_argv(spec: &EnvironmentSpec, root: &Path, interpreter: Option<&Path>) -> Vec<String> {
    let envdir = root.to_string_lossy();
    let interpreter = interpreter
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    spec.installer()
        .iter()
        .map(|arg| arg.replace("{envdir}", &envdir).replace("{interpreter}", &interpreter))
        .chain(spec.dependencies().iter().cloned())
        .collect()
}

fn context_env(
    spec: &EnvironmentSpec,
    root: Option<&Path>,
    interpreter: Option<&Path>,
    search_path: Option<&OsString>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(ENV_NAME_VAR.to_string(), spec.name().to_string());

    if let Some(root) = root {
        env.insert(ENV_DIR_VAR.to_string(), root.to_string_lossy().into_owned());

        let bin = root.join("bin");
        let mut entries = vec![bin];
        if let Some(existing) = search_path {
            entries.extend(std::env::split_paths(existing));
        }
        if let Ok(joined) = std::env::join_paths(entries) {
            env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
        }
    }

    if let Some(interpreter) = interpreter {
        env.insert(
            INTERPRETER_VAR.to_string(),
            interpreter.to_string_lossy().into_owned(),
        );
    }

    env.extend(spec.setenv().iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

fn io_error(path: &Path, source: std::io::Error) -> ProvisionError {
    ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn clear_except_bin(root: &Path) -> Result<(), ProvisionError> {
    let entries = std::fs::read_dir(root).map_err(|source| io_error(root, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| io_error(root, source))?;
        if entry.file_name() == "bin" {
            continue;
        }
        let path = entry.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.map_err(|source| io_error(&path, source))?;
    }
    Ok(())
}

fn read_state(root: &Path) -> Result<Option<ContextState>, ProvisionError> {
    let path = root.join(STATE_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(source) => {
                // A corrupt state file only forces a rebuild.
                tracing::warn!(path = %path.display(), error = %source, "ignoring unreadable context state");
                Ok(None)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(io_error(&path, source)),
    }
}

fn write_state(
    root: &Path,
    digest: &str,
    dependencies: &[String],
    interpreter: Option<&Path>,
) -> Result<(), ProvisionError> {
    let path = root.join(STATE_FILE);
    let state = ContextState {
        digest: digest.to_string(),
        dependencies: dependencies.to_vec(),
        interpreter: interpreter.map(Path::to_path_buf),
        created_at: Utc::now(),
    };
    let content = serde_json::to_string_pretty(&state).map_err(|source| ProvisionError::State {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, content).map_err(|source| io_error(&path, source))
}
