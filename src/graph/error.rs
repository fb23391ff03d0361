//! Errors raised while building and ordering the resource graph.
use std::fmt;

use thiserror::Error;

use crate::resources::{Provenance, ResourceKind, TargetPath};

/// Why two declarations cannot be merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The declarations create different kinds of entry at one path.
    IncompatibleKinds {
        /// Kind declared first.
        existing: ResourceKind,
        /// Kind declared later.
        incoming: ResourceKind,
    },
    /// The path (or an ancestor) was removed earlier in the same compilation.
    DeclaredAfterRemoval {
        /// Kind declared after the removal.
        incoming: ResourceKind,
    },
    /// An entry was declared beneath a path that is not a directory.
    NotADirectory {
        /// The non-directory ancestor.
        ancestor: TargetPath,
        /// Its kind.
        kind: ResourceKind,
    },
    /// Strict mode: a later declaration changes a value set earlier.
    Override {
        /// Kind of the overridden declaration.
        kind: ResourceKind,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompatibleKinds { existing, incoming } => {
                write!(f, "{incoming} declared where a {existing} already is")
            }
            Self::DeclaredAfterRemoval { incoming } => {
                write!(f, "{incoming} declared after the path was removed")
            }
            Self::NotADirectory { ancestor, kind } => {
                write!(f, "ancestor '{ancestor}' is a {kind}, not a directory")
            }
            Self::Override { kind } => {
                write!(f, "{kind} overridden with a different value in strict mode")
            }
        }
    }
}

/// Two declarations at one path are structurally incompatible.
///
/// Compilation aborts; nothing is emitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("conflict at '{path}': {reason} (declared by {first} and {second})")]
pub struct ConflictError {
    /// Path at which the conflict was detected.
    pub path: TargetPath,
    /// Provenance of the earlier declaration.
    pub first: Provenance,
    /// Provenance of the later declaration.
    pub second: Provenance,
    /// What makes them incompatible.
    pub reason: ConflictReason,
}

/// Declarations refer to paths that never materialize.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A permission-set or extended-attribute declaration targets a path
    /// that has no primary entry and is not an ancestor of one.
    #[error("'{path}' is adjusted by {declared_by} but nothing creates it")]
    UnresolvedTarget {
        /// The adjusted path.
        path: TargetPath,
        /// The first adjusting declaration.
        declared_by: Provenance,
    },

    /// An explicit `requires` names a path that is missing or removed.
    #[error("'{path}' requires '{required}', which is not declared")]
    MissingDependency {
        /// Declaring path.
        path: TargetPath,
        /// The missing path.
        required: TargetPath,
        /// The declaration carrying the requirement.
        declared_by: Provenance,
    },
}

/// Anything that stops the graph from being built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Structurally incompatible declarations.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Dangling adjustment or dependency.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// The dependency relation is not a strict partial order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle detected between: {}", display_paths(.paths))]
pub struct CycleError {
    /// Paths participating in (or trapped between) cycles, sorted.
    pub paths: Vec<TargetPath>,
}

fn display_paths(paths: &[TargetPath]) -> String {
    paths
        .iter()
        .map(TargetPath::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(raw: &str) -> TargetPath {
        TargetPath::parse(raw).unwrap()
    }

    #[test]
    fn conflict_display_names_both_manifests() {
        let e = ConflictError {
            path: p("/etc/x"),
            first: Provenance::new("base", 0),
            second: Provenance::new("site", 4),
            reason: ConflictReason::IncompatibleKinds {
                existing: ResourceKind::Directory,
                incoming: ResourceKind::RegularFile,
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("/etc/x"));
        assert!(msg.contains("base#0"));
        assert!(msg.contains("site#4"));
        assert!(msg.contains("regular-file declared where a directory already is"));
    }

    #[test]
    fn not_a_directory_display() {
        let reason = ConflictReason::NotADirectory {
            ancestor: p("/etc/motd"),
            kind: ResourceKind::RegularFile,
        };
        assert_eq!(
            reason.to_string(),
            "ancestor '/etc/motd' is a regular-file, not a directory"
        );
    }

    #[test]
    fn cycle_display_lists_paths() {
        let e = CycleError {
            paths: vec![p("/a"), p("/b")],
        };
        assert_eq!(e.to_string(), "dependency cycle detected between: /a, /b");
    }

    #[test]
    fn missing_dependency_display() {
        let e = GraphError::MissingDependency {
            path: p("/srv/app"),
            required: p("/etc/app"),
            declared_by: Provenance::new("app", 1),
        };
        assert_eq!(
            e.to_string(),
            "'/srv/app' requires '/etc/app', which is not declared"
        );
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn graph_errors_are_send_sync() {
        assert_send_sync::<ConflictError>();
        assert_send_sync::<GraphError>();
        assert_send_sync::<BuildError>();
        assert_send_sync::<CycleError>();
    }
}
