//! Deterministic topological ordering of the resource graph.

use std::collections::{BTreeSet, HashMap};

use super::error::CycleError;
use super::{BuildWarning, ResourceGraph, ResourceNode};
use crate::resources::{Provenance, TargetPath};

/// Nodes in application order: every node appears after all of its
/// dependencies.
///
/// Produced once per compilation by [`resolve`] and consumed by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSequence {
    nodes: Vec<ResourceNode>,
    warnings: Vec<BuildWarning>,
}

impl ResolvedSequence {
    /// Nodes in resolved order.
    #[must_use]
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Iterate nodes in resolved order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResourceNode> {
        self.nodes.iter()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Position of `path` in the sequence.
    #[must_use]
    pub fn position(&self, path: &TargetPath) -> Option<usize> {
        self.nodes.iter().position(|n| n.path == *path)
    }

    /// Provenance recorded for `path`.
    #[must_use]
    pub fn provenance(&self, path: &TargetPath) -> &[Provenance] {
        self.nodes
            .iter()
            .find(|n| n.path == *path)
            .map(|n| n.provenance.as_slice())
            .unwrap_or_default()
    }

    /// Warnings carried over from the build.
    #[must_use]
    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }
}

impl<'a> IntoIterator for &'a ResolvedSequence {
    type Item = &'a ResourceNode;
    type IntoIter = std::slice::Iter<'a, ResourceNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Order the graph with Kahn's algorithm.
///
/// Among nodes whose dependencies are all placed, the smallest
/// `(path, declared-order)` goes next, so the result is a pure function of
/// the graph.  Parent directories precede their contents because every node
/// depends on its parent.
///
/// # Errors
///
/// Returns [`CycleError`] with the sorted set of paths that could not be
/// placed because of a cycle among explicit `requires`.
pub fn resolve(graph: ResourceGraph) -> Result<ResolvedSequence, CycleError> {
    let (nodes, warnings) = graph.into_parts();
    let mut slots: Vec<Option<ResourceNode>> = nodes.into_values().map(Some).collect();

    let index: HashMap<TargetPath, usize> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, n)| n.as_ref().map(|n| (n.path.clone(), i)))
        .collect();

    let mut in_degree: Vec<usize> = vec![0; slots.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); slots.len()];
    for (i, node) in slots.iter().enumerate() {
        let Some(node) = node else { continue };
        for dep in &node.dependencies {
            if let Some(&dep_idx) = index.get(dep)
                && let Some(list) = dependents.get_mut(dep_idx)
            {
                list.push(i);
                if let Some(count) = in_degree.get_mut(i) {
                    *count += 1;
                }
            }
        }
    }

    let key = |i: usize, slots: &[Option<ResourceNode>]| {
        slots
            .get(i)
            .and_then(Option::as_ref)
            .map(|n| (n.path.clone(), n.order, i))
    };

    let mut ready: BTreeSet<(TargetPath, usize, usize)> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .filter_map(|(i, _)| key(i, &slots))
        .collect();

    let mut ordered = Vec::with_capacity(slots.len());
    while let Some((_, _, idx)) = ready.pop_first() {
        let Some(node) = slots.get_mut(idx).and_then(Option::take) else {
            continue;
        };
        ordered.push(node);
        let Some(list) = dependents.get(idx) else {
            continue;
        };
        for &dep in list {
            if let Some(count) = in_degree.get_mut(dep) {
                *count -= 1;
                if *count == 0
                    && let Some(k) = key(dep, &slots)
                {
                    ready.insert(k);
                }
            }
        }
    }

    if ordered.len() != slots.len() {
        return Err(cycle_error(&slots, &dependents));
    }

    tracing::debug!("resolved {} node(s)", ordered.len());
    Ok(ResolvedSequence {
        nodes: ordered,
        warnings,
    })
}

/// Report the unplaced nodes that sit on a cycle, dropping those that are
/// only stuck behind one.
fn cycle_error(slots: &[Option<ResourceNode>], dependents: &[Vec<usize>]) -> CycleError {
    let mut remaining: BTreeSet<usize> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, n)| n.as_ref().map(|_| i))
        .collect();

    loop {
        let leaves: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| {
                dependents
                    .get(i)
                    .is_none_or(|list| !list.iter().any(|d| remaining.contains(d)))
            })
            .collect();
        if leaves.is_empty() {
            break;
        }
        for leaf in leaves {
            remaining.remove(&leaf);
        }
    }

    let mut paths: Vec<TargetPath> = remaining
        .into_iter()
        .filter_map(|i| slots.get(i).and_then(Option::as_ref).map(|n| n.path.clone()))
        .collect();
    paths.sort();
    CycleError { paths }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::graph::{BuildOptions, build};
    use crate::resources::{EntrySpec, Manifest, Permissions, Xattr};

    fn p(raw: &str) -> TargetPath {
        TargetPath::parse(raw).unwrap()
    }

    fn resolved(manifest: Manifest) -> ResolvedSequence {
        resolve(build(manifest, BuildOptions::default()).unwrap()).unwrap()
    }

    fn paths(seq: &ResolvedSequence) -> Vec<&str> {
        seq.iter().map(|n| n.path.as_str()).collect()
    }

    /// Every dependency precedes its dependent.
    fn assert_topological(seq: &ResolvedSequence) {
        for (i, node) in seq.iter().enumerate() {
            for dep in &node.dependencies {
                let j = seq.position(dep).unwrap();
                assert!(j < i, "{dep} must precede {}", node.path);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn directories_precede_contents() {
        let mut m = Manifest::new("m");
        m.push("/etc/ssh/sshd_config", EntrySpec::file("B")).unwrap();
        m.push("/etc/ssh", EntrySpec::directory()).unwrap();
        m.push("/etc/hosts", EntrySpec::file("127.0.0.1 localhost\n"))
            .unwrap();
        let seq = resolved(m);
        assert_eq!(
            paths(&seq),
            vec!["/", "/etc", "/etc/hosts", "/etc/ssh", "/etc/ssh/sshd_config"]
        );
        assert_topological(&seq);
    }

    #[test]
    fn ties_break_by_path_not_declaration_order() {
        let mut m = Manifest::new("m");
        m.push("/b", EntrySpec::file("b")).unwrap();
        m.push("/a", EntrySpec::file("a")).unwrap();
        m.push("/a-b", EntrySpec::file("ab")).unwrap();
        let seq = resolved(m);
        assert_eq!(paths(&seq), vec!["/", "/a", "/a-b", "/b"]);
    }

    #[test]
    fn requires_reorders_across_subtrees() {
        let mut m = Manifest::new("m");
        m.push("/z/config", EntrySpec::file("z")).unwrap();
        m.push_requiring("/a/service", EntrySpec::file("a"), ["/z/config"])
            .unwrap();
        let seq = resolved(m);
        let cfg = seq.position(&p("/z/config")).unwrap();
        let svc = seq.position(&p("/a/service")).unwrap();
        assert!(cfg < svc);
        assert_topological(&seq);
    }

    #[test]
    fn adjustments_do_not_add_nodes() {
        let mut m = Manifest::new("m");
        m.push("/etc/x", EntrySpec::file("x")).unwrap();
        m.push("/etc/x", Permissions::new().with_mode(0o600)).unwrap();
        m.push("/etc/x", Xattr::new("user.a", "1")).unwrap();
        let seq = resolved(m);
        assert_eq!(paths(&seq), vec!["/", "/etc", "/etc/x"]);
        assert_eq!(seq.provenance(&p("/etc/x")).len(), 3);
    }

    #[test]
    fn resolution_is_repeatable() {
        let make = || {
            let mut m = Manifest::new("m");
            for path in ["/srv/b/2", "/srv/a/1", "/etc/c", "/srv/a"] {
                m.push(path, EntrySpec::directory()).unwrap();
            }
            m
        };
        assert_eq!(resolved(make()), resolved(make()));
    }

    #[test]
    fn warnings_are_carried_over() {
        let mut m = Manifest::new("m");
        m.push("/etc/motd", EntrySpec::file("A")).unwrap();
        m.push("/etc/motd", EntrySpec::file("B")).unwrap();
        assert_eq!(resolved(m).warnings().len(), 1);
    }

    #[test]
    fn empty_graph_resolves_to_empty_sequence() {
        let seq = resolve(ResourceGraph::default()).unwrap();
        assert!(seq.is_empty());
    }

    // -----------------------------------------------------------------------
    // Cycles
    // -----------------------------------------------------------------------

    #[test]
    fn requires_cycle_is_reported() {
        let mut m = Manifest::new("m");
        m.push_requiring("/a", EntrySpec::file("a"), ["/b"]).unwrap();
        m.push_requiring("/b", EntrySpec::file("b"), ["/a"]).unwrap();
        let graph = build(m, BuildOptions::default()).unwrap();
        let err = resolve(graph).unwrap_err();
        assert_eq!(err.paths, vec![p("/a"), p("/b")]);
    }

    #[test]
    fn cycle_report_excludes_nodes_only_blocked_by_it() {
        let mut m = Manifest::new("m");
        m.push_requiring("/x", EntrySpec::directory(), ["/y"]).unwrap();
        m.push_requiring("/y", EntrySpec::directory(), ["/x"]).unwrap();
        m.push("/x/child", EntrySpec::file("c")).unwrap();
        m.push("/free", EntrySpec::file("f")).unwrap();
        let graph = build(m, BuildOptions::default()).unwrap();
        let err = resolve(graph).unwrap_err();
        assert_eq!(err.paths, vec![p("/x"), p("/y")]);
    }

    #[test]
    fn cycle_through_parent_is_reported() {
        let mut m = Manifest::new("m");
        m.push_requiring("/a", EntrySpec::directory(), ["/a/b"])
            .unwrap();
        m.push("/a/b", EntrySpec::file("b")).unwrap();
        let graph = build(m, BuildOptions::default()).unwrap();
        let err = resolve(graph).unwrap_err();
        assert_eq!(err.paths, vec![p("/a"), p("/a/b")]);
    }
}
