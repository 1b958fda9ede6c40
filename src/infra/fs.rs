//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations, such as
//! creating context directories, preserving failed contexts and locating
//! interpreters on `PATH`.
//!
//! 此模块提供文件系统操作的实用功能，
//! 如创建上下文目录、保留失败的上下文以及在 `PATH` 上定位解释器。

use anyhow::{Context, Result};
use fs_extra::dir::{CopyOptions, copy};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Creates a fresh directory at `path`, removing whatever was there before.
///
/// # Arguments
/// * `path` - Directory to (re)create
pub fn recreate_dir(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)
}

/// Creates a uniquely named temporary directory inside `parent`, deleted when
/// the returned guard is dropped.
///
/// # Arguments
/// * `parent` - Directory the temporary directory is created in
/// * `name` - Environment name, used as a readable prefix
pub fn tempdir_in(parent: &Path, name: &str) -> std::io::Result<TempDir> {
    fs::create_dir_all(parent)?;
    tempfile::Builder::new()
        .prefix(&format!("{name}-"))
        .tempdir_in(parent)
}

/// Copies the entire content of a source directory to a destination directory,
/// replacing any previous copy.
///
/// # Arguments
/// * `from` - Source directory path
/// * `to` - Destination directory path
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)
            .with_context(|| format!("Failed to clean up old copy: {}", to.display()))?;
    }
    fs::create_dir_all(to)?;
    let mut options = CopyOptions::new();
    options.overwrite = true;
    options.content_only = true;
    copy(from, to, &options)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Gets the absolute path from a potentially relative path.
///
/// # Returns
/// Canonicalized absolute path, or an error if the path doesn't exist
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}

/// Resolves an interpreter selector to an executable path.
/// A selector containing a path separator is checked directly; a bare name is
/// searched for on `search_path` (normally the value of `PATH`).
///
/// 将解释器选择器解析为可执行文件路径。
pub fn find_executable(selector: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(selector);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let search_path = search_path?;
    std::env::split_paths(search_path)
        .flat_map(|dir| executable_names(selector).map(move |name| dir.join(name)))
        .find(|path| is_executable(path))
}

#[cfg(windows)]
fn executable_names(selector: &str) -> impl Iterator<Item = String> {
    [selector.to_string(), format!("{selector}.exe")].into_iter()
}

#[cfg(not(windows))]
fn executable_names(selector: &str) -> impl Iterator<Item = String> {
    std::iter::once(selector.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
