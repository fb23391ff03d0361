//! Merge policy: fold an ordered declaration stream into one node per path.
use std::collections::{BTreeMap, BTreeSet};

use super::error::{BuildError, ConflictError, ConflictReason, GraphError};
use super::{BuildWarning, NodeState, ResourceGraph, ResourceNode};
use crate::resources::{
    EntrySpec, Permissions, Provenance, Resource, ResourceDeclaration, ResourceKind, TargetPath,
    Xattr,
};

/// How same-kind overrides with differing values are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Last writer wins; the override is recorded as a [`BuildWarning`].
    #[default]
    Lenient,
    /// Any override that changes a value is a [`ConflictError`].
    Strict,
}

/// Options controlling the merge policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Override handling.
    pub strictness: Strictness,
}

impl BuildOptions {
    /// Options with [`Strictness::Strict`].
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            strictness: Strictness::Strict,
        }
    }

    const fn is_strict(self) -> bool {
        matches!(self.strictness, Strictness::Strict)
    }
}

/// Creation state of a path while declarations are still arriving.
#[derive(Debug)]
enum Primary {
    /// Only adjustments so far.
    Pending,
    /// An explicit primary entry.
    Entry { spec: EntrySpec, by: Provenance },
    /// Synthesized ancestor directory.
    Implicit,
    /// Removal marker.
    Removed { by: Provenance },
}

#[derive(Debug)]
struct Adjustment {
    permissions: Permissions,
    last: Provenance,
}

#[derive(Debug)]
struct Draft {
    primary: Primary,
    adjustment: Option<Adjustment>,
    xattrs: BTreeMap<String, (Vec<u8>, Provenance)>,
    requires: Vec<(TargetPath, Provenance)>,
    provenance: Vec<Provenance>,
    order: usize,
}

impl Draft {
    const fn new(primary: Primary, order: usize) -> Self {
        Self {
            primary,
            adjustment: None,
            xattrs: BTreeMap::new(),
            requires: Vec::new(),
            provenance: Vec::new(),
            order,
        }
    }

    fn has_state(&self) -> bool {
        !matches!(self.primary, Primary::Pending | Primary::Removed { .. })
            || self.adjustment.is_some()
            || !self.xattrs.is_empty()
    }

    const fn exists(&self) -> bool {
        matches!(self.primary, Primary::Entry { .. } | Primary::Implicit)
    }
}

/// Incrementally merges declarations into a [`ResourceGraph`].
///
/// Declarations must be added in their authoritative order (manifests
/// concatenated in caller order).  Conflicts are reported as soon as the
/// offending declaration arrives; structural checks that need the complete
/// set (implicit directories, non-directory ancestors, dangling adjustments
/// and dependencies) run in [`finish`](Self::finish).
///
/// # Examples
///
/// ```
/// use confbundler::graph::{BuildOptions, GraphBuilder};
/// use confbundler::resources::{EntrySpec, Manifest, TargetPath};
///
/// let mut manifest = Manifest::new("motd");
/// manifest.push("/etc/motd", EntrySpec::file("A")).unwrap();
/// manifest.push("/etc/motd", EntrySpec::file("B")).unwrap();
///
/// let mut builder = GraphBuilder::new(BuildOptions::default());
/// for decl in manifest {
///     builder.add(decl).unwrap();
/// }
/// let graph = builder.finish().unwrap();
/// let motd = TargetPath::parse("/etc/motd").unwrap();
/// assert_eq!(graph.provenance(&motd).len(), 2);
/// assert_eq!(graph.warnings().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    options: BuildOptions,
    drafts: BTreeMap<TargetPath, Draft>,
    warnings: Vec<BuildWarning>,
    seen: usize,
}

impl GraphBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Merge one declaration.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictError`] if the declaration is incompatible with what
    /// was declared before it.
    pub fn add(&mut self, decl: ResourceDeclaration) -> Result<(), ConflictError> {
        let (path, resource, provenance, requires) = decl.into_parts();
        let order = self.seen;
        self.seen += 1;

        match resource {
            Resource::Absent => self.remove(&path, &provenance, order),
            Resource::Entry(spec) => {
                self.check_not_removed(&path, spec.kind(), &provenance)?;
                self.create(&path, spec, &provenance, order)?;
            }
            Resource::Permissions(permissions) => {
                self.check_not_removed(&path, ResourceKind::PermissionSet, &provenance)?;
                self.adjust(&path, permissions, &provenance, order)?;
            }
            Resource::Xattr(xattr) => {
                self.check_not_removed(&path, ResourceKind::ExtendedAttribute, &provenance)?;
                self.attach(&path, xattr, &provenance, order)?;
            }
        }

        let draft = self
            .drafts
            .entry(path)
            .or_insert_with(|| Draft::new(Primary::Pending, order));
        for required in requires {
            if !draft.requires.iter().any(|(p, _)| *p == required) {
                draft.requires.push((required, provenance.clone()));
            }
        }
        draft.provenance.push(provenance);
        Ok(())
    }

    /// Finish building: synthesize implicit directories, check the hierarchy
    /// and dependencies, and fold adjustments into their entries.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Conflict`] if an entry sits beneath a
    /// non-directory, or [`BuildError::Graph`] for an adjustment with nothing
    /// to adjust or a `requires` naming a path that does not exist.
    pub fn finish(self) -> Result<ResourceGraph, BuildError> {
        let Self {
            mut drafts,
            warnings,
            ..
        } = self;

        synthesize_ancestors(&mut drafts)?;
        check_requires(&drafts)?;

        let present: BTreeSet<TargetPath> = drafts.keys().cloned().collect();
        let mut nodes = BTreeMap::new();
        for (path, draft) in drafts {
            let Draft {
                primary,
                adjustment,
                xattrs,
                requires,
                provenance,
                order,
            } = draft;

            let overlay = adjustment.map(|a| a.permissions).unwrap_or_default();
            let state = match primary {
                Primary::Entry { mut spec, .. } => {
                    spec.permissions = spec.permissions.overlaid(&overlay);
                    NodeState::Declared(spec)
                }
                Primary::Implicit => {
                    let mut spec = EntrySpec::directory();
                    spec.permissions = overlay;
                    NodeState::Implicit(spec)
                }
                Primary::Removed { .. } => NodeState::Absent,
                Primary::Pending => {
                    let declared_by = provenance
                        .first()
                        .cloned()
                        .unwrap_or_else(|| Provenance::new("", order));
                    return Err(GraphError::UnresolvedTarget { path, declared_by }.into());
                }
            };

            let mut dependencies: BTreeSet<TargetPath> =
                requires.into_iter().map(|(p, _)| p).collect();
            if let Some(parent) = path.parent()
                && present.contains(&parent)
            {
                dependencies.insert(parent);
            }

            let node = ResourceNode {
                path: path.clone(),
                state,
                xattrs: xattrs.into_iter().map(|(k, (v, _))| (k, v)).collect(),
                dependencies,
                provenance,
                order,
            };
            nodes.insert(path, node);
        }

        Ok(ResourceGraph::from_parts(nodes, warnings))
    }

    fn check_not_removed(
        &self,
        path: &TargetPath,
        incoming: ResourceKind,
        by: &Provenance,
    ) -> Result<(), ConflictError> {
        let removal = std::iter::once(path.clone())
            .chain(path.ancestors())
            .find_map(|p| match self.drafts.get(&p) {
                Some(Draft {
                    primary: Primary::Removed { by: first },
                    ..
                }) => Some(first.clone()),
                _ => None,
            });
        match removal {
            Some(first) => Err(ConflictError {
                path: path.clone(),
                first,
                second: by.clone(),
                reason: ConflictReason::DeclaredAfterRemoval { incoming },
            }),
            None => Ok(()),
        }
    }

    fn draft(&mut self, path: &TargetPath, order: usize) -> &mut Draft {
        self.drafts
            .entry(path.clone())
            .or_insert_with(|| Draft::new(Primary::Pending, order))
    }

    fn create(
        &mut self,
        path: &TargetPath,
        spec: EntrySpec,
        by: &Provenance,
        order: usize,
    ) -> Result<(), ConflictError> {
        let strict = self.options.is_strict();
        let draft = self.draft(path, order);

        if matches!(draft.primary, Primary::Pending | Primary::Implicit) {
            draft.primary = Primary::Entry {
                spec,
                by: by.clone(),
            };
            return Ok(());
        }

        let (existing, first) = match &mut draft.primary {
            Primary::Entry { spec, by } => (spec, by),
            Primary::Removed { by: first } => {
                return Err(ConflictError {
                    path: path.clone(),
                    first: first.clone(),
                    second: by.clone(),
                    reason: ConflictReason::DeclaredAfterRemoval {
                        incoming: spec.kind(),
                    },
                });
            }
            Primary::Pending | Primary::Implicit => return Ok(()),
        };

        if existing.kind() != spec.kind() {
            return Err(ConflictError {
                path: path.clone(),
                first: first.clone(),
                second: by.clone(),
                reason: ConflictReason::IncompatibleKinds {
                    existing: existing.kind(),
                    incoming: spec.kind(),
                },
            });
        }
        if *existing == spec {
            return Ok(());
        }

        let kind = spec.kind();
        if strict {
            return Err(ConflictError {
                path: path.clone(),
                first: first.clone(),
                second: by.clone(),
                reason: ConflictReason::Override { kind },
            });
        }

        let warning = BuildWarning::new(
            path.clone(),
            format!("{kind} overridden by a later declaration"),
            vec![first.clone(), by.clone()],
        );
        *existing = spec;
        *first = by.clone();
        self.record(warning);
        Ok(())
    }

    fn adjust(
        &mut self,
        path: &TargetPath,
        permissions: Permissions,
        by: &Provenance,
        order: usize,
    ) -> Result<(), ConflictError> {
        let strict = self.options.is_strict();
        let draft = self.draft(path, order);

        let Some(adjustment) = &mut draft.adjustment else {
            draft.adjustment = Some(Adjustment {
                permissions,
                last: by.clone(),
            });
            return Ok(());
        };

        let changed = overrides(&adjustment.permissions, &permissions);
        let previous = std::mem::replace(&mut adjustment.last, by.clone());
        adjustment.permissions = adjustment.permissions.overlaid(&permissions);
        if changed.is_empty() {
            return Ok(());
        }

        if strict {
            return Err(ConflictError {
                path: path.clone(),
                first: previous,
                second: by.clone(),
                reason: ConflictReason::Override {
                    kind: ResourceKind::PermissionSet,
                },
            });
        }
        self.record(BuildWarning::new(
            path.clone(),
            format!("{} overridden by a later permission-set", changed.join(", ")),
            vec![previous, by.clone()],
        ));
        Ok(())
    }

    fn attach(
        &mut self,
        path: &TargetPath,
        xattr: Xattr,
        by: &Provenance,
        order: usize,
    ) -> Result<(), ConflictError> {
        let strict = self.options.is_strict();
        let draft = self.draft(path, order);

        let Some((value, first)) = draft.xattrs.get_mut(&xattr.name) else {
            draft.xattrs.insert(xattr.name, (xattr.value, by.clone()));
            return Ok(());
        };
        if *value == xattr.value {
            return Ok(());
        }

        if strict {
            return Err(ConflictError {
                path: path.clone(),
                first: first.clone(),
                second: by.clone(),
                reason: ConflictReason::Override {
                    kind: ResourceKind::ExtendedAttribute,
                },
            });
        }
        let previous = std::mem::replace(first, by.clone());
        *value = xattr.value;
        self.record(BuildWarning::new(
            path.clone(),
            format!("extended attribute '{}' overridden", xattr.name),
            vec![previous, by.clone()],
        ));
        Ok(())
    }

    fn remove(&mut self, path: &TargetPath, by: &Provenance, order: usize) {
        let mut cancelled: Vec<TargetPath> = Vec::new();
        self.drafts.retain(|p, _| {
            if p.is_descendant_of(path) {
                cancelled.push(p.clone());
                false
            } else {
                true
            }
        });

        let draft = self.draft(path, order);
        if draft.has_state() {
            cancelled.insert(0, path.clone());
        }
        draft.primary = Primary::Removed { by: by.clone() };
        draft.adjustment = None;
        draft.xattrs.clear();
        draft.requires.clear();

        if !cancelled.is_empty() {
            self.record(BuildWarning::new(
                path.clone(),
                format!(
                    "removal cancels earlier declarations for {} path(s)",
                    cancelled.len()
                ),
                vec![by.clone()],
            ));
        }
    }

    fn record(&mut self, warning: BuildWarning) {
        tracing::debug!("{warning}");
        self.warnings.push(warning);
    }
}

/// Names of the fields `overlay` sets to a value different from one already
/// set in `base`.
fn overrides(base: &Permissions, overlay: &Permissions) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if matches!((base.mode, overlay.mode), (Some(a), Some(b)) if a != b) {
        fields.push("mode");
    }
    if matches!((&base.owner, &overlay.owner), (Some(a), Some(b)) if a != b) {
        fields.push("owner");
    }
    if matches!((&base.group, &overlay.group), (Some(a), Some(b)) if a != b) {
        fields.push("group");
    }
    fields
}

/// Walk up from every explicit entry, turning missing or adjustment-only
/// ancestors into implicit directories.
fn synthesize_ancestors(drafts: &mut BTreeMap<TargetPath, Draft>) -> Result<(), ConflictError> {
    let entries: Vec<(TargetPath, Provenance, usize)> = drafts
        .iter()
        .filter_map(|(path, draft)| match &draft.primary {
            Primary::Entry { by, .. } => Some((path.clone(), by.clone(), draft.order)),
            Primary::Pending | Primary::Implicit | Primary::Removed { .. } => None,
        })
        .collect();

    for (path, by, order) in entries {
        for ancestor in path.ancestors() {
            let Some(draft) = drafts.get_mut(&ancestor) else {
                tracing::debug!("synthesizing implicit directory {ancestor}");
                drafts.insert(ancestor, Draft::new(Primary::Implicit, order));
                continue;
            };
            match &draft.primary {
                Primary::Entry { spec, .. } if spec.kind() == ResourceKind::Directory => break,
                Primary::Implicit => break,
                Primary::Entry { spec, by: first } => {
                    return Err(ConflictError {
                        path: path.clone(),
                        first: first.clone(),
                        second: by.clone(),
                        reason: ConflictReason::NotADirectory {
                            kind: spec.kind(),
                            ancestor,
                        },
                    });
                }
                Primary::Removed { by: first } => {
                    return Err(ConflictError {
                        path: path.clone(),
                        first: first.clone(),
                        second: by.clone(),
                        reason: ConflictReason::DeclaredAfterRemoval {
                            incoming: ResourceKind::Directory,
                        },
                    });
                }
                Primary::Pending => {}
            }
            tracing::debug!("adjusted path {ancestor} becomes an implicit directory");
            draft.primary = Primary::Implicit;
        }
    }

    if let Some(root) = drafts.get_mut(&TargetPath::root())
        && matches!(root.primary, Primary::Pending)
    {
        root.primary = Primary::Implicit;
    }
    Ok(())
}

fn check_requires(drafts: &BTreeMap<TargetPath, Draft>) -> Result<(), GraphError> {
    for (path, draft) in drafts {
        for (required, declared_by) in &draft.requires {
            if !drafts.get(required).is_some_and(Draft::exists) {
                return Err(GraphError::MissingDependency {
                    path: path.clone(),
                    required: required.clone(),
                    declared_by: declared_by.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::resources::{DeviceClass, Manifest, Principal};

    fn p(raw: &str) -> TargetPath {
        TargetPath::parse(raw).unwrap()
    }

    fn build(manifests: Vec<Manifest>, options: BuildOptions) -> Result<ResourceGraph, BuildError> {
        super::super::build(crate::resources::manifest::concat(manifests), options)
    }

    fn lenient(manifests: Vec<Manifest>) -> ResourceGraph {
        build(manifests, BuildOptions::default()).unwrap()
    }

    fn conflict(result: Result<ResourceGraph, BuildError>) -> ConflictError {
        match result {
            Err(BuildError::Conflict(e)) => e,
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Same-kind merging
    // -----------------------------------------------------------------------

    #[test]
    fn later_file_content_wins_and_keeps_both_provenances() {
        let mut a = Manifest::new("a");
        a.push("/etc/motd", EntrySpec::file("A")).unwrap();
        let mut b = Manifest::new("b");
        b.push("/etc/motd", EntrySpec::file("B")).unwrap();

        let graph = lenient(vec![a, b]);
        let node = graph.get(&p("/etc/motd")).unwrap();
        assert_eq!(node.state, NodeState::Declared(EntrySpec::file("B")));
        assert_eq!(
            graph.provenance(&p("/etc/motd")),
            &[Provenance::new("a", 0), Provenance::new("b", 0)]
        );
        assert_eq!(graph.warnings().len(), 1);
        assert!(graph.warnings()[0].message.contains("overridden"));
    }

    #[test]
    fn identical_redeclaration_is_silent() {
        let mut m = Manifest::new("m");
        m.push("/etc/motd", EntrySpec::file("A").with_mode(0o644))
            .unwrap();
        m.push("/etc/motd", EntrySpec::file("A").with_mode(0o644))
            .unwrap();
        let graph = build(vec![m], BuildOptions::strict()).unwrap();
        assert!(graph.warnings().is_empty());
        assert_eq!(graph.provenance(&p("/etc/motd")).len(), 2);
    }

    #[test]
    fn strict_mode_rejects_differing_override() {
        let mut m = Manifest::new("m");
        m.push("/etc/motd", EntrySpec::file("A")).unwrap();
        m.push("/etc/motd", EntrySpec::file("B")).unwrap();
        let err = conflict(build(vec![m], BuildOptions::strict()));
        assert_eq!(
            err.reason,
            ConflictReason::Override {
                kind: ResourceKind::RegularFile
            }
        );
        assert_eq!(err.first, Provenance::new("m", 0));
        assert_eq!(err.second, Provenance::new("m", 1));
    }

    #[test]
    fn symlink_target_last_writer_wins() {
        let mut m = Manifest::new("m");
        m.push("/usr/bin/vi", EntrySpec::symlink("vim")).unwrap();
        m.push("/usr/bin/vi", EntrySpec::symlink("nvim")).unwrap();
        let graph = lenient(vec![m]);
        let node = graph.get(&p("/usr/bin/vi")).unwrap();
        assert_eq!(node.state, NodeState::Declared(EntrySpec::symlink("nvim")));
    }

    // -----------------------------------------------------------------------
    // Incompatible kinds
    // -----------------------------------------------------------------------

    #[test]
    fn directory_and_file_at_same_path_conflict() {
        let mut a = Manifest::new("a");
        a.push("/etc/x", EntrySpec::directory()).unwrap();
        let mut b = Manifest::new("b");
        b.push("/etc/x", EntrySpec::file("x")).unwrap();

        let err = conflict(build(vec![a, b], BuildOptions::default()));
        assert_eq!(err.path, p("/etc/x"));
        assert_eq!(err.first.manifest, "a");
        assert_eq!(err.second.manifest, "b");
        assert_eq!(
            err.reason,
            ConflictReason::IncompatibleKinds {
                existing: ResourceKind::Directory,
                incoming: ResourceKind::RegularFile,
            }
        );
    }

    #[test]
    fn fifo_and_device_conflict() {
        let mut m = Manifest::new("m");
        m.push("/dev/x", EntrySpec::fifo()).unwrap();
        m.push("/dev/x", EntrySpec::device(DeviceClass::Char, 1, 3))
            .unwrap();
        let err = conflict(build(vec![m], BuildOptions::default()));
        assert!(matches!(err.reason, ConflictReason::IncompatibleKinds { .. }));
    }

    #[test]
    fn entry_beneath_file_is_not_a_directory() {
        let mut m = Manifest::new("m");
        m.push("/etc/motd", EntrySpec::file("hi")).unwrap();
        m.push("/etc/motd/child", EntrySpec::file("x")).unwrap();
        let err = conflict(build(vec![m], BuildOptions::default()));
        assert_eq!(err.path, p("/etc/motd/child"));
        assert_eq!(
            err.reason,
            ConflictReason::NotADirectory {
                ancestor: p("/etc/motd"),
                kind: ResourceKind::RegularFile,
            }
        );
    }

    #[test]
    fn entry_beneath_symlink_is_not_a_directory() {
        let mut m = Manifest::new("m");
        m.push("/opt/app", EntrySpec::symlink("/srv/app")).unwrap();
        m.push("/opt/app/bin/run", EntrySpec::file("#!/bin/sh\n"))
            .unwrap();
        let err = conflict(build(vec![m], BuildOptions::default()));
        assert!(matches!(
            err.reason,
            ConflictReason::NotADirectory {
                kind: ResourceKind::Symlink,
                ..
            }
        ));
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    #[test]
    fn creation_after_removal_conflicts() {
        let mut m = Manifest::new("m");
        m.push("/etc/old.conf", Resource::Absent).unwrap();
        m.push("/etc/old.conf", EntrySpec::file("x")).unwrap();
        let err = conflict(build(vec![m], BuildOptions::default()));
        assert_eq!(
            err.reason,
            ConflictReason::DeclaredAfterRemoval {
                incoming: ResourceKind::RegularFile
            }
        );
    }

    #[test]
    fn creation_beneath_removed_path_conflicts() {
        let mut m = Manifest::new("m");
        m.push("/srv/old", Resource::Absent).unwrap();
        m.push("/srv/old/data", EntrySpec::directory()).unwrap();
        let err = conflict(build(vec![m], BuildOptions::default()));
        assert_eq!(err.path, p("/srv/old/data"));
    }

    #[test]
    fn adjustment_after_removal_conflicts() {
        let mut m = Manifest::new("m");
        m.push("/etc/old.conf", Resource::Absent).unwrap();
        m.push("/etc/old.conf", Xattr::new("user.a", "1")).unwrap();
        let err = conflict(build(vec![m], BuildOptions::default()));
        assert_eq!(
            err.reason,
            ConflictReason::DeclaredAfterRemoval {
                incoming: ResourceKind::ExtendedAttribute
            }
        );
    }

    #[test]
    fn removal_cancels_path_and_descendants() {
        let mut m = Manifest::new("m");
        m.push("/srv/app", EntrySpec::directory()).unwrap();
        m.push("/srv/app/conf", EntrySpec::file("x")).unwrap();
        m.push("/srv/app/conf", Xattr::new("user.a", "1")).unwrap();
        m.push("/srv/app", Resource::Absent).unwrap();

        let graph = lenient(vec![m]);
        assert!(graph.get(&p("/srv/app/conf")).is_none());
        let node = graph.get(&p("/srv/app")).unwrap();
        assert!(node.is_removal());
        assert!(node.xattrs.is_empty());
        assert_eq!(graph.warnings().len(), 1);
        assert!(graph.warnings()[0].message.contains("2 path(s)"));
    }

    #[test]
    fn repeated_removal_is_silent() {
        let mut m = Manifest::new("m");
        m.push("/etc/old", Resource::Absent).unwrap();
        m.push("/etc/old", Resource::Absent).unwrap();
        let graph = lenient(vec![m]);
        assert!(graph.warnings().is_empty());
        assert!(graph.get(&p("/etc/old")).unwrap().is_removal());
    }

    // -----------------------------------------------------------------------
    // Permission-sets and extended attributes
    // -----------------------------------------------------------------------

    #[test]
    fn permission_set_folds_into_entry() {
        let mut m = Manifest::new("m");
        m.push(
            "/etc/shadow",
            EntrySpec::file("").with_mode(0o644).with_owner(Principal::name("root")),
        )
        .unwrap();
        m.push("/etc/shadow", Permissions::new().with_mode(0o640))
            .unwrap();
        m.push(
            "/etc/shadow",
            Permissions::new().with_group(Principal::name("shadow")),
        )
        .unwrap();

        let graph = lenient(vec![m]);
        let spec = graph.get(&p("/etc/shadow")).unwrap().state.entry().unwrap();
        assert_eq!(spec.permissions.mode.unwrap().bits(), 0o640);
        assert_eq!(spec.permissions.owner, Some(Principal::name("root")));
        assert_eq!(spec.permissions.group, Some(Principal::name("shadow")));
        assert!(graph.warnings().is_empty());
    }

    #[test]
    fn permission_set_before_entry_still_applies() {
        let mut m = Manifest::new("m");
        m.push("/etc/x", Permissions::new().with_mode(0o600)).unwrap();
        m.push("/etc/x", EntrySpec::file("x")).unwrap();
        let graph = lenient(vec![m]);
        let spec = graph.get(&p("/etc/x")).unwrap().state.entry().unwrap();
        assert_eq!(spec.permissions.mode.unwrap().bits(), 0o600);
    }

    #[test]
    fn differing_permission_sets_warn_or_conflict() {
        let make = || {
            let mut m = Manifest::new("m");
            m.push("/etc/x", EntrySpec::file("x")).unwrap();
            m.push("/etc/x", Permissions::new().with_mode(0o600)).unwrap();
            m.push("/etc/x", Permissions::new().with_mode(0o640)).unwrap();
            m
        };
        let graph = lenient(vec![make()]);
        assert_eq!(graph.warnings().len(), 1);
        assert!(graph.warnings()[0].message.starts_with("mode"));

        let err = conflict(build(vec![make()], BuildOptions::strict()));
        assert_eq!(
            err.reason,
            ConflictReason::Override {
                kind: ResourceKind::PermissionSet
            }
        );
    }

    #[test]
    fn xattrs_accumulate_by_name() {
        let mut m = Manifest::new("m");
        m.push("/etc/x", EntrySpec::file("x")).unwrap();
        m.push("/etc/x", Xattr::new("user.a", "1")).unwrap();
        m.push("/etc/x", Xattr::new("user.b", "2")).unwrap();
        m.push("/etc/x", Xattr::new("user.a", "3")).unwrap();

        let graph = lenient(vec![m]);
        let node = graph.get(&p("/etc/x")).unwrap();
        assert_eq!(node.xattrs.len(), 2);
        assert_eq!(node.xattrs["user.a"], b"3".to_vec());
        assert_eq!(node.xattrs["user.b"], b"2".to_vec());
        assert_eq!(graph.warnings().len(), 1);
    }

    #[test]
    fn adjustment_without_entry_is_unresolved() {
        let mut m = Manifest::new("m");
        m.push("/etc/x", EntrySpec::file("x")).unwrap();
        m.push("/etc/ghost", Permissions::new().with_mode(0o600))
            .unwrap();
        let err = build(vec![m], BuildOptions::default()).unwrap_err();
        assert_eq!(
            err,
            BuildError::Graph(GraphError::UnresolvedTarget {
                path: p("/etc/ghost"),
                declared_by: Provenance::new("m", 1),
            })
        );
    }

    #[test]
    fn adjusted_ancestor_becomes_implicit_directory() {
        let mut m = Manifest::new("m");
        m.push("/srv", Permissions::new().with_mode(0o750)).unwrap();
        m.push("/srv/app/run", EntrySpec::file("x")).unwrap();
        let graph = lenient(vec![m]);
        let srv = graph.get(&p("/srv")).unwrap();
        assert!(srv.is_implicit());
        assert_eq!(
            srv.state.entry().unwrap().permissions.mode.unwrap().bits(),
            0o750
        );
    }

    #[test]
    fn adjusted_root_is_always_resolvable() {
        let mut m = Manifest::new("m");
        m.push("/", Xattr::new("user.root", "yes")).unwrap();
        let graph = lenient(vec![m]);
        assert!(graph.get(&TargetPath::root()).unwrap().is_implicit());
    }

    // -----------------------------------------------------------------------
    // Hierarchy and dependencies
    // -----------------------------------------------------------------------

    #[test]
    fn implicit_directories_are_synthesized() {
        let mut m = Manifest::new("m");
        m.push("/a/b/c", EntrySpec::file("c")).unwrap();
        let graph = lenient(vec![m]);

        for dir in ["/", "/a", "/a/b"] {
            let node = graph.get(&p(dir)).unwrap();
            assert!(node.is_implicit(), "{dir} should be implicit");
            assert_eq!(node.kind(), ResourceKind::Directory);
        }
        let c = graph.get(&p("/a/b/c")).unwrap();
        assert_eq!(c.dependencies, BTreeSet::from([p("/a/b")]));
        assert!(graph.get(&TargetPath::root()).unwrap().dependencies.is_empty());
    }

    #[test]
    fn explicit_directory_is_not_replaced() {
        let mut m = Manifest::new("m");
        m.push("/etc/ssh/sshd_config", EntrySpec::file("B")).unwrap();
        m.push("/etc/ssh", EntrySpec::directory().with_mode(0o700))
            .unwrap();
        let graph = lenient(vec![m]);
        let ssh = graph.get(&p("/etc/ssh")).unwrap();
        assert!(!ssh.is_implicit());
        assert_eq!(ssh.order, 1);
    }

    #[test]
    fn requires_become_dependencies() {
        let mut m = Manifest::new("m");
        m.push("/etc/app.conf", EntrySpec::file("x")).unwrap();
        m.push_requiring("/srv/app", EntrySpec::directory(), ["/etc/app.conf"])
            .unwrap();
        let graph = lenient(vec![m]);
        let node = graph.get(&p("/srv/app")).unwrap();
        assert!(node.dependencies.contains(&p("/etc/app.conf")));
        assert!(node.dependencies.contains(&p("/srv")));
    }

    #[test]
    fn requires_on_missing_path_fails() {
        let mut m = Manifest::new("m");
        m.push_requiring("/srv/app", EntrySpec::directory(), ["/etc/app.conf"])
            .unwrap();
        let err = build(vec![m], BuildOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Graph(GraphError::MissingDependency { .. })
        ));
    }

    #[test]
    fn requires_on_removed_path_fails() {
        let mut m = Manifest::new("m");
        m.push("/etc/old", Resource::Absent).unwrap();
        m.push_requiring("/srv/app", EntrySpec::directory(), ["/etc/old"])
            .unwrap();
        assert!(build(vec![m], BuildOptions::default()).is_err());
    }

    #[test]
    fn empty_input_builds_empty_graph() {
        let graph = lenient(Vec::new());
        assert!(graph.is_empty());
    }
}
