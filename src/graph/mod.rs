//! Resource graph: one merged node per target path plus dependency edges.
//!
//! The graph is produced by [`GraphBuilder`] and consumed once by
//! [`resolve`](resolve::resolve).  Every non-root node depends on its parent
//! directory; permission-set and extended-attribute declarations never become
//! nodes of their own but are folded into the node for their path, which is
//! how "adjustments come after the primary entry" holds structurally.
pub mod builder;
pub mod error;
pub mod resolve;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::resources::{EntrySpec, Provenance, ResourceDeclaration, ResourceKind, TargetPath};

pub use builder::{BuildOptions, GraphBuilder, Strictness};
pub use error::{BuildError, ConflictError, ConflictReason, CycleError, GraphError};
pub use resolve::{ResolvedSequence, resolve};

/// What a node realizes after merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// An explicitly declared primary entry, with permission-set overlays
    /// already folded into its permissions.
    Declared(EntrySpec),
    /// A directory synthesized because something beneath it was declared.
    Implicit(EntrySpec),
    /// A removal marker.
    Absent,
}

impl NodeState {
    /// Effective kind of the node.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Declared(spec) | Self::Implicit(spec) => spec.kind(),
            Self::Absent => ResourceKind::Absent,
        }
    }

    /// The entry to create, if any.
    #[must_use]
    pub const fn entry(&self) -> Option<&EntrySpec> {
        match self {
            Self::Declared(spec) | Self::Implicit(spec) => Some(spec),
            Self::Absent => None,
        }
    }
}

/// One distinct path in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    /// Identity key.
    pub path: TargetPath,
    /// Merged state.
    pub state: NodeState,
    /// Extended attributes keyed by name.
    pub xattrs: BTreeMap<String, Vec<u8>>,
    /// Paths that must be realized first.
    pub dependencies: BTreeSet<TargetPath>,
    /// Every declaration that contributed, in declaration order.
    pub provenance: Vec<Provenance>,
    /// Position of the first contributing declaration in the concatenated
    /// input; tie-break after the path.
    pub order: usize,
}

impl ResourceNode {
    /// Effective kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.state.kind()
    }

    /// Returns `true` for synthesized directories.
    #[must_use]
    pub const fn is_implicit(&self) -> bool {
        matches!(self.state, NodeState::Implicit(_))
    }

    /// Returns `true` for removal markers.
    #[must_use]
    pub const fn is_removal(&self) -> bool {
        matches!(self.state, NodeState::Absent)
    }
}

/// A non-fatal finding recorded while building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildWarning {
    /// Path the warning is about.
    pub path: TargetPath,
    /// Human-readable message.
    pub message: String,
    /// Declarations involved.
    pub provenance: Vec<Provenance>,
}

impl BuildWarning {
    /// Create a warning.
    #[must_use]
    pub fn new(path: TargetPath, message: impl Into<String>, provenance: Vec<Provenance>) -> Self {
        Self {
            path,
            message: message.into(),
            provenance,
        }
    }
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if !self.provenance.is_empty() {
            let sources: Vec<String> = self.provenance.iter().map(ToString::to_string).collect();
            write!(f, " ({})", sources.join(", "))?;
        }
        Ok(())
    }
}

/// The merged node set.  Frozen once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceGraph {
    nodes: BTreeMap<TargetPath, ResourceNode>,
    warnings: Vec<BuildWarning>,
}

impl ResourceGraph {
    pub(crate) const fn from_parts(
        nodes: BTreeMap<TargetPath, ResourceNode>,
        warnings: Vec<BuildWarning>,
    ) -> Self {
        Self { nodes, warnings }
    }

    /// Look up the node for a path.
    #[must_use]
    pub fn get(&self, path: &TargetPath) -> Option<&ResourceNode> {
        self.nodes.get(path)
    }

    /// Every declaration that touched `path`, overridden ones included.
    #[must_use]
    pub fn provenance(&self, path: &TargetPath) -> &[Provenance] {
        self.nodes
            .get(path)
            .map(|node| node.provenance.as_slice())
            .unwrap_or_default()
    }

    /// Nodes in path order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Number of nodes (implicit directories included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Warnings recorded while building.
    #[must_use]
    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<TargetPath, ResourceNode>, Vec<BuildWarning>) {
        (self.nodes, self.warnings)
    }
}

/// Build a graph from declarations in one call.
///
/// # Errors
///
/// Returns [`BuildError`] on the first conflict, or on a dangling adjustment
/// or dependency.
pub fn build<I>(declarations: I, options: BuildOptions) -> Result<ResourceGraph, BuildError>
where
    I: IntoIterator<Item = ResourceDeclaration>,
{
    let mut builder = GraphBuilder::new(options);
    for decl in declarations {
        builder.add(decl)?;
    }
    builder.finish()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::Manifest;

    #[test]
    fn build_warning_display_lists_sources() {
        let w = BuildWarning::new(
            TargetPath::parse("/etc/motd").unwrap(),
            "content overridden",
            vec![Provenance::new("a", 0), Provenance::new("b", 0)],
        );
        assert_eq!(w.to_string(), "/etc/motd: content overridden (a#0, b#0)");
    }

    #[test]
    fn provenance_of_unknown_path_is_empty() {
        let graph = ResourceGraph::default();
        assert!(graph.provenance(&TargetPath::root()).is_empty());
    }

    #[test]
    fn build_convenience_matches_builder() {
        let mut m = Manifest::new("m");
        m.push("/etc/motd", EntrySpec::file("hi")).unwrap();
        let graph = build(m, BuildOptions::default()).unwrap();
        assert_eq!(graph.len(), 3);
        let node = graph.get(&TargetPath::parse("/etc/motd").unwrap()).unwrap();
        assert_eq!(node.kind(), ResourceKind::RegularFile);
        assert!(!node.is_implicit());
    }
}
