//! Declarative filesystem configuration bundler.
//!
//! Manifests declare desired filesystem state (directories, files, links,
//! special files, ownership, permissions, extended attributes). The
//! compiler merges them into one graph, orders it so that every entry
//! follows what it depends on, and renders it through a backend, typically
//! a tar archive that a stock `tar --xattrs` reproduces on the target.
//!
//! The public API is organised into layers:
//!
//! - **[`resources`]**: typed, validated declarations
//! - **[`graph`]**: merge policy, implicit directories, ordering
//! - **[`backend`]**: serialization targets (archive, plan)
//! - **[`compiler`]**: the whole pipeline in one call
//! - **[`config`]**: TOML manifests and settings
//! - **[`commands`]**: top-level subcommand orchestration (`compile`, `plan`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod backend;
pub mod cli;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod resources;

pub use compiler::{Artifact, CompileOptions, CompileReport, Compiler, compile, compile_to_vec};
pub use error::{ConfigError, Error};
