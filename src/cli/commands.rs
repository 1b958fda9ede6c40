//! # Commands Module / 命令模块
//!
//! Implementations of the `run`, `list` and `init` subcommands.
//!
//! `run`、`list` 和 `init` 子命令的实现。

pub mod init;
pub mod list;
pub mod run;
