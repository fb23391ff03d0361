//! Resource model: typed declarations of desired filesystem state.
//!
//! A [`ResourceDeclaration`] pairs a normalized [`TargetPath`] with one
//! [`Resource`] variant and the [`Provenance`] it came from.  Construction
//! validates every kind-specific constraint, so everything downstream (graph
//! builder, resolver, backends) can assume well-formed input.
pub mod error;
pub mod manifest;
pub mod path;
pub mod permissions;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::InvalidDeclaration;
pub use manifest::Manifest;
pub use path::TargetPath;
pub use permissions::{MODE_MAX, Mode, Permissions, Principal};

/// Character or block special file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Character device.
    Char,
    /// Block device.
    Block,
}

/// The content-bearing part of a primary entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entry {
    /// A directory.
    Directory,
    /// A regular file with its full content.
    File {
        /// File content, written verbatim.
        content: Vec<u8>,
    },
    /// A symbolic link.
    Symlink {
        /// Link target, stored as given (may be relative).
        target: String,
    },
    /// A named pipe.
    Fifo,
    /// A device node.
    Device {
        /// Character or block.
        class: DeviceClass,
        /// Device major number.
        major: u32,
        /// Device minor number.
        minor: u32,
    },
}

impl Entry {
    /// The resource kind this entry declares.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Directory => ResourceKind::Directory,
            Self::File { .. } => ResourceKind::RegularFile,
            Self::Symlink { .. } => ResourceKind::Symlink,
            Self::Fifo => ResourceKind::Fifo,
            Self::Device { .. } => ResourceKind::Device,
        }
    }
}

/// A primary entry together with its inline metadata.
///
/// # Examples
///
/// ```
/// use confbundler::resources::{EntrySpec, Principal};
///
/// let spec = EntrySpec::file("PermitRootLogin no\n")
///     .with_mode(0o600)
///     .with_owner(Principal::name("root"));
/// assert_eq!(spec.permissions.mode.unwrap().bits(), 0o600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntrySpec {
    /// What to create.
    pub entry: Entry,
    /// Inline mode and ownership.
    pub permissions: Permissions,
    /// Modification time in seconds since the epoch; backend default if unset.
    pub mtime: Option<u64>,
    /// Access time in seconds since the epoch; not recorded if unset.
    pub atime: Option<u64>,
}

impl EntrySpec {
    fn bare(entry: Entry) -> Self {
        Self {
            entry,
            permissions: Permissions::default(),
            mtime: None,
            atime: None,
        }
    }

    /// A directory.
    #[must_use]
    pub fn directory() -> Self {
        Self::bare(Entry::Directory)
    }

    /// A regular file.
    #[must_use]
    pub fn file(content: impl Into<Vec<u8>>) -> Self {
        Self::bare(Entry::File {
            content: content.into(),
        })
    }

    /// A symbolic link pointing at `target`.
    #[must_use]
    pub fn symlink(target: impl Into<String>) -> Self {
        Self::bare(Entry::Symlink {
            target: target.into(),
        })
    }

    /// A named pipe.
    #[must_use]
    pub fn fifo() -> Self {
        Self::bare(Entry::Fifo)
    }

    /// A device node.
    #[must_use]
    pub fn device(class: DeviceClass, major: u32, minor: u32) -> Self {
        Self::bare(Entry::Device {
            class,
            major,
            minor,
        })
    }

    /// Set the permission bits.
    #[must_use]
    pub fn with_mode(mut self, bits: u32) -> Self {
        self.permissions = self.permissions.with_mode(bits);
        self
    }

    /// Set the owning user.
    #[must_use]
    pub fn with_owner(mut self, owner: Principal) -> Self {
        self.permissions = self.permissions.with_owner(owner);
        self
    }

    /// Set the owning group.
    #[must_use]
    pub fn with_group(mut self, group: Principal) -> Self {
        self.permissions = self.permissions.with_group(group);
        self
    }

    /// Set the modification time.
    #[must_use]
    pub const fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Set the access time.
    #[must_use]
    pub const fn with_atime(mut self, atime: u64) -> Self {
        self.atime = Some(atime);
        self
    }

    /// Shorthand for `self.entry.kind()`.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.entry.kind()
    }
}

/// One extended attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xattr {
    /// Attribute name including its namespace (e.g. `user.managed`).
    pub name: String,
    /// Raw attribute value.
    pub value: Vec<u8>,
}

impl Xattr {
    /// Create an attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One declared unit of desired state.
///
/// Closed set: every consumer (graph builder, resolver, backends) matches
/// exhaustively, so adding a variant is a compile-time checked change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Create a directory, file, symlink, fifo or device node.
    Entry(EntrySpec),
    /// Adjust mode/ownership of the entry at the same path.
    Permissions(Permissions),
    /// Attach an extended attribute to the entry at the same path.
    Xattr(Xattr),
    /// Ensure nothing exists at the path.
    Absent,
}

impl Resource {
    /// The declared kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Entry(spec) => spec.kind(),
            Self::Permissions(_) => ResourceKind::PermissionSet,
            Self::Xattr(_) => ResourceKind::ExtendedAttribute,
            Self::Absent => ResourceKind::Absent,
        }
    }
}

impl From<EntrySpec> for Resource {
    fn from(spec: EntrySpec) -> Self {
        Self::Entry(spec)
    }
}

impl From<Permissions> for Resource {
    fn from(perms: Permissions) -> Self {
        Self::Permissions(perms)
    }
}

impl From<Xattr> for Resource {
    fn from(xattr: Xattr) -> Self {
        Self::Xattr(xattr)
    }
}

/// Discriminant of [`Resource`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Directory.
    Directory,
    /// Regular file.
    RegularFile,
    /// Symbolic link.
    Symlink,
    /// Named pipe.
    Fifo,
    /// Device node.
    Device,
    /// Mode/ownership adjustment.
    PermissionSet,
    /// Extended attribute.
    ExtendedAttribute,
    /// Removal marker.
    Absent,
}

impl ResourceKind {
    /// Returns `true` for kinds that create something (a primary entry).
    #[must_use]
    pub const fn is_primary(self) -> bool {
        matches!(
            self,
            Self::Directory | Self::RegularFile | Self::Symlink | Self::Fifo | Self::Device
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Directory => "directory",
            Self::RegularFile => "regular-file",
            Self::Symlink => "symlink",
            Self::Fifo => "fifo",
            Self::Device => "device",
            Self::PermissionSet => "permission-set",
            Self::ExtendedAttribute => "extended-attribute",
            Self::Absent => "absent",
        })
    }
}

/// Where a declaration came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Provenance {
    /// Identifier of the source manifest.
    pub manifest: String,
    /// Position within that manifest (0-based).
    pub order: usize,
}

impl Provenance {
    /// Create a provenance record.
    #[must_use]
    pub fn new(manifest: impl Into<String>, order: usize) -> Self {
        Self {
            manifest: manifest.into(),
            order,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.manifest, self.order)
    }
}

/// A validated declaration: the unit of compiler input.
///
/// Only [`ResourceDeclaration::new`] builds one, so every declaration that
/// reaches the graph builder has passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDeclaration {
    path: TargetPath,
    resource: Resource,
    provenance: Provenance,
    requires: Vec<TargetPath>,
}

impl ResourceDeclaration {
    /// Validate and build a declaration.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDeclaration`] if the path is not absolute and
    /// normalizable, or the payload breaks a kind-specific constraint
    /// (mode out of range, empty symlink target, empty or malformed
    /// attribute name, empty permission-set, bad owner/group).
    pub fn new(
        path: &str,
        resource: impl Into<Resource>,
        provenance: Provenance,
    ) -> Result<Self, InvalidDeclaration> {
        let target = TargetPath::parse(path)?;
        let resource = resource.into();
        validate_resource(path, &resource)?;
        if target.is_root()
            && let Resource::Entry(spec) = &resource
            && spec.kind() != ResourceKind::Directory
        {
            return Err(InvalidDeclaration::new(
                path,
                "kind",
                format!("the root can only be a directory, not a {}", spec.kind()),
            ));
        }
        Ok(Self {
            path: target,
            resource,
            provenance,
            requires: Vec::new(),
        })
    }

    /// Add explicit dependencies on other paths.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDeclaration`] (field `requires`) if a path is invalid
    /// or names the declaration's own path.
    pub fn with_requires<I, S>(mut self, requires: I) -> Result<Self, InvalidDeclaration>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in requires {
            let required = TargetPath::parse(raw.as_ref()).map_err(|e| {
                InvalidDeclaration::new(self.path.as_str(), "requires", e.reason)
            })?;
            if required == self.path {
                return Err(InvalidDeclaration::new(
                    self.path.as_str(),
                    "requires",
                    "a declaration cannot require its own path",
                ));
            }
            if !self.requires.contains(&required) {
                self.requires.push(required);
            }
        }
        Ok(self)
    }

    /// Identity key.
    #[must_use]
    pub const fn path(&self) -> &TargetPath {
        &self.path
    }

    /// What is declared at [`path`](Self::path).
    #[must_use]
    pub const fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Source manifest and position.
    #[must_use]
    pub const fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Paths that must be realized before this one, beyond the parent
    /// directory.
    #[must_use]
    pub fn requires(&self) -> &[TargetPath] {
        &self.requires
    }

    /// Shorthand for `self.resource().kind()`.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    /// Split into path, resource, provenance and requirements.
    pub(crate) fn into_parts(self) -> (TargetPath, Resource, Provenance, Vec<TargetPath>) {
        (self.path, self.resource, self.provenance, self.requires)
    }
}

fn validate_resource(path: &str, resource: &Resource) -> Result<(), InvalidDeclaration> {
    match resource {
        Resource::Entry(spec) => {
            spec.permissions.validate(path)?;
            match &spec.entry {
                Entry::Symlink { target } if target.is_empty() => Err(InvalidDeclaration::new(
                    path,
                    "target",
                    "symlink target is empty",
                )),
                Entry::Symlink { target } if target.contains('\0') => Err(
                    InvalidDeclaration::new(path, "target", "symlink target contains a NUL byte"),
                ),
                Entry::Directory
                | Entry::File { .. }
                | Entry::Symlink { .. }
                | Entry::Fifo
                | Entry::Device { .. } => Ok(()),
            }
        }
        Resource::Permissions(perms) => {
            if perms.is_empty() {
                return Err(InvalidDeclaration::new(
                    path,
                    "permissions",
                    "permission-set declares neither mode, owner nor group",
                ));
            }
            perms.validate(path)
        }
        Resource::Xattr(xattr) => {
            if xattr.name.is_empty() {
                return Err(InvalidDeclaration::new(path, "xattr", "attribute name is empty"));
            }
            if xattr.name.contains(['\0', '=']) {
                return Err(InvalidDeclaration::new(
                    path,
                    "xattr",
                    format!("attribute name '{}' contains NUL or '='", xattr.name.escape_default()),
                ));
            }
            Ok(())
        }
        Resource::Absent => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn prov() -> Provenance {
        Provenance::new("test", 0)
    }

    #[test]
    fn new_normalizes_path() {
        let decl = ResourceDeclaration::new("/etc//motd/", EntrySpec::file("hi"), prov()).unwrap();
        assert_eq!(decl.path().as_str(), "/etc/motd");
        assert_eq!(decl.kind(), ResourceKind::RegularFile);
    }

    #[test]
    fn new_rejects_relative_path() {
        let err = ResourceDeclaration::new("etc/motd", EntrySpec::file("hi"), prov()).unwrap_err();
        assert_eq!(err.field, "path");
    }

    #[test]
    fn new_rejects_mode_out_of_range() {
        let err =
            ResourceDeclaration::new("/etc/x", EntrySpec::file("").with_mode(0o20000), prov())
                .unwrap_err();
        assert_eq!(err.field, "mode");
    }

    #[test]
    fn new_rejects_empty_symlink_target() {
        let err = ResourceDeclaration::new("/etc/x", EntrySpec::symlink(""), prov()).unwrap_err();
        assert_eq!(err.field, "target");
    }

    #[test]
    fn new_rejects_empty_xattr_name() {
        let err = ResourceDeclaration::new("/etc/x", Xattr::new("", "v"), prov()).unwrap_err();
        assert_eq!(err.field, "xattr");
    }

    #[test]
    fn new_rejects_xattr_name_with_equals() {
        assert!(ResourceDeclaration::new("/etc/x", Xattr::new("user.a=b", "v"), prov()).is_err());
    }

    #[test]
    fn new_rejects_empty_permission_set() {
        let err = ResourceDeclaration::new("/etc/x", Permissions::new(), prov()).unwrap_err();
        assert_eq!(err.field, "permissions");
    }

    #[test]
    fn new_rejects_unnamed_owner() {
        let perms = Permissions::new().with_owner(Principal::name(""));
        let err = ResourceDeclaration::new("/etc/x", perms, prov()).unwrap_err();
        assert_eq!(err.field, "owner");
    }

    #[test]
    fn root_accepts_only_a_directory() {
        let dir = EntrySpec::directory().with_mode(0o755);
        assert!(ResourceDeclaration::new("/", dir, prov()).is_ok());
        for spec in [
            EntrySpec::file("oops"),
            EntrySpec::symlink("/srv"),
            EntrySpec::fifo(),
            EntrySpec::device(DeviceClass::Char, 1, 3),
        ] {
            let err = ResourceDeclaration::new("/", spec, prov()).unwrap_err();
            assert_eq!(err.field, "kind");
            assert_eq!(err.path, "/");
        }
    }

    #[test]
    fn root_accepts_adjustments() {
        let perms = Permissions::new().with_mode(0o755);
        assert!(ResourceDeclaration::new("/", perms, prov()).is_ok());
        assert!(ResourceDeclaration::new("/", Xattr::new("user.a", "1"), prov()).is_ok());
    }

    #[test]
    fn absent_needs_no_payload() {
        let decl = ResourceDeclaration::new("/etc/old", Resource::Absent, prov()).unwrap();
        assert_eq!(decl.kind(), ResourceKind::Absent);
        assert!(!decl.kind().is_primary());
    }

    #[test]
    fn requires_are_normalized_and_deduplicated() {
        let decl = ResourceDeclaration::new("/srv/app", EntrySpec::directory(), prov())
            .unwrap()
            .with_requires(["/etc/app/", "/etc/app"])
            .unwrap();
        assert_eq!(decl.requires(), vec![TargetPath::parse("/etc/app").unwrap()]);
    }

    #[test]
    fn requires_rejects_self() {
        let err = ResourceDeclaration::new("/srv/app", EntrySpec::directory(), prov())
            .unwrap()
            .with_requires(["/srv/app"])
            .unwrap_err();
        assert_eq!(err.field, "requires");
    }

    #[test]
    fn kind_display_matches_vocabulary() {
        assert_eq!(ResourceKind::RegularFile.to_string(), "regular-file");
        assert_eq!(ResourceKind::ExtendedAttribute.to_string(), "extended-attribute");
    }

    #[test]
    fn kind_display_honours_width() {
        assert_eq!(format!("{:<12}|", ResourceKind::Fifo), "fifo        |");
    }

    #[test]
    fn provenance_display() {
        assert_eq!(Provenance::new("base", 3).to_string(), "base#3");
    }
}
