//! Top-level error type for the bundler.
//!
//! Each layer returns its own typed error ([`InvalidDeclaration`],
//! [`ConflictError`], [`GraphError`], [`CycleError`], [`BackendError`],
//! [`ConfigError`]). [`Error`] aggregates them for callers that drive the
//! whole pipeline, and command handlers at the CLI boundary convert it to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! Error
//! ├── InvalidDeclaration  malformed declaration
//! ├── Conflict            incompatible declarations for one path
//! ├── Graph               unresolved target, missing dependency
//! ├── Cycle               dependency cycle
//! ├── Backend             unsupported operation, unencodable value, I/O
//! └── Config              manifest and settings files
//! ```
use thiserror::Error;

use crate::backend::BackendError;
use crate::graph::{BuildError, ConflictError, CycleError, GraphError};
use crate::resources::InvalidDeclaration;

/// Anything a compilation can fail with.
#[derive(Error, Debug)]
pub enum Error {
    /// A declaration was rejected before graph construction.
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(#[from] InvalidDeclaration),

    /// Two declarations cannot be reconciled.
    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// The graph is incomplete.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// The graph cannot be ordered.
    #[error("Ordering error: {0}")]
    Cycle(#[from] CycleError),

    /// The backend refused or failed to render the sequence.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A manifest or settings file could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Conflict(e) => Self::Conflict(e),
            BuildError::Graph(e) => Self::Graph(e),
        }
    }
}

/// Errors that arise from loading manifest and settings files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML document could not be parsed or does not match the schema.
    #[error("Invalid TOML in {file}: {message}")]
    InvalidSyntax {
        /// File being parsed.
        file: String,
        /// Parser message.
        message: String,
    },

    /// A `[[resource]]` table is well-formed TOML but not a valid resource.
    #[error("Invalid resource #{index} in {file}: {message}")]
    InvalidResource {
        /// Manifest file.
        file: String,
        /// 0-based position of the table in the `resource` array.
        index: usize,
        /// What is wrong with it.
        message: String,
    },

    /// A resource was rejected by the resource model.
    #[error("Invalid resource #{index} in {file}: {source}")]
    Declaration {
        /// Manifest file.
        file: String,
        /// 0-based position of the table in the `resource` array.
        index: usize,
        /// Underlying validation error.
        source: InvalidDeclaration,
    },

    /// An I/O error occurred while reading a file.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;
