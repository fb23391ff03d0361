//! Manifest files: one TOML document per manifest.
//!
//! ```toml
//! id = "ssh"                       # optional, defaults to the file stem
//!
//! [[resource]]
//! kind = "directory"
//! path = "/etc/ssh"
//! mode = 0o755
//!
//! [[resource]]
//! kind = "file"
//! path = "/etc/ssh/sshd_config"
//! source = "files/sshd_config"     # or `content` / `content_base64`
//! mode = "600"
//! owner = { name = "root", id = 0 }
//! xattrs = { "user.managed" = "true" }
//! ```
//!
//! Inline `xattrs` expand to extended-attribute declarations directly after
//! the entry, in name order.
//!
//! A `from-host` resource copies an entry from the host filesystem.  With a
//! `glob`, `source` is a host tree and every match lands under `path` at its
//! position relative to that tree:
//!
//! ```toml
//! [[resource]]
//! kind = "from-host"
//! path = "/"
//! source = "rootfs"
//! glob = "etc/**/*.conf"
//! ```
//!
//! Glob matches never replace an entry the same manifest declares
//! explicitly, and an earlier glob keeps a path a later one also matches.
use base64::Engine as _;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::host::{self, HostError};
use super::toml_loader;
use crate::error::ConfigError;
use crate::resources::{
    DeviceClass, EntrySpec, InvalidDeclaration, Manifest, Mode, Permissions, Principal, Resource,
    TargetPath, Xattr,
};

/// Top-level document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    id: Option<String>,
    #[serde(default, rename = "resource")]
    resources: Vec<RawResource>,
}

/// Declared kind of a `[[resource]]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RawKind {
    Directory,
    #[serde(alias = "regular-file")]
    File,
    Symlink,
    Fifo,
    Device,
    #[serde(alias = "permission-set")]
    Permissions,
    #[serde(alias = "extended-attribute")]
    Xattr,
    Absent,
    FromHost,
}

impl RawKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::File => "file",
            Self::Symlink => "symlink",
            Self::Fifo => "fifo",
            Self::Device => "device",
            Self::Permissions => "permissions",
            Self::Xattr => "xattr",
            Self::Absent => "absent",
            Self::FromHost => "from-host",
        }
    }

    /// Optional fields this kind accepts.
    const fn allowed(self) -> &'static [&'static str] {
        const ENTRY: &[&str] = &["mode", "owner", "group", "mtime", "atime", "xattrs"];
        match self {
            Self::Directory | Self::Fifo => ENTRY,
            Self::File => &[
                "mode",
                "owner",
                "group",
                "mtime",
                "atime",
                "xattrs",
                "content",
                "content_base64",
                "source",
            ],
            Self::Symlink => &["mode", "owner", "group", "mtime", "atime", "xattrs", "target"],
            Self::Device => &[
                "mode", "owner", "group", "mtime", "atime", "xattrs", "class", "major", "minor",
            ],
            Self::FromHost => &[
                "mode", "owner", "group", "mtime", "atime", "xattrs", "source", "glob",
            ],
            Self::Permissions => &["mode", "owner", "group"],
            Self::Xattr => &["name", "value", "value_base64"],
            Self::Absent => &[],
        }
    }
}

/// Mode as a TOML integer (`0o755`) or an octal string (`"755"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMode {
    Bits(i64),
    Octal(String),
}

/// Owner or group as a name, an id, or both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrincipal {
    Id(u64),
    Name(String),
    Full {
        name: Option<String>,
        id: Option<u64>,
    },
}

/// One `[[resource]]` table, before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    kind: RawKind,
    path: String,
    #[serde(default)]
    requires: Vec<String>,
    mode: Option<RawMode>,
    owner: Option<RawPrincipal>,
    group: Option<RawPrincipal>,
    mtime: Option<u64>,
    atime: Option<u64>,
    #[serde(default)]
    xattrs: BTreeMap<String, String>,
    content: Option<String>,
    content_base64: Option<String>,
    source: Option<PathBuf>,
    glob: Option<String>,
    target: Option<String>,
    class: Option<DeviceClass>,
    major: Option<u32>,
    minor: Option<u32>,
    name: Option<String>,
    value: Option<String>,
    value_base64: Option<String>,
}

impl RawResource {
    fn present(&self) -> Vec<&'static str> {
        [
            ("mode", self.mode.is_some()),
            ("owner", self.owner.is_some()),
            ("group", self.group.is_some()),
            ("mtime", self.mtime.is_some()),
            ("atime", self.atime.is_some()),
            ("xattrs", !self.xattrs.is_empty()),
            ("content", self.content.is_some()),
            ("content_base64", self.content_base64.is_some()),
            ("source", self.source.is_some()),
            ("glob", self.glob.is_some()),
            ("target", self.target.is_some()),
            ("class", self.class.is_some()),
            ("major", self.major.is_some()),
            ("minor", self.minor.is_some()),
            ("name", self.name.is_some()),
            ("value", self.value.is_some()),
            ("value_base64", self.value_base64.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, set)| set.then_some(field))
        .collect()
    }

    /// Whether this table expands a host glob rather than naming one path.
    const fn is_glob(&self) -> bool {
        matches!(self.kind, RawKind::FromHost) && self.glob.is_some()
    }

    /// Whether this table names a whole entry, or its removal, at `path`.
    const fn is_explicit_entry(&self) -> bool {
        !self.is_glob() && !matches!(self.kind, RawKind::Permissions | RawKind::Xattr)
    }
}

/// Paths glob matches may not take: those declared explicitly in the same
/// manifest and those an earlier glob already matched.
struct GlobClaims {
    explicit: BTreeSet<TargetPath>,
    matched: BTreeSet<TargetPath>,
}

impl GlobClaims {
    fn new(resources: &[RawResource]) -> Self {
        let explicit = resources
            .iter()
            .filter(|raw| raw.is_explicit_entry())
            .filter_map(|raw| TargetPath::parse(&raw.path).ok())
            .collect();
        Self {
            explicit,
            matched: BTreeSet::new(),
        }
    }

    /// Take `path` for a glob match; `false` if something else holds it.
    fn claim(&mut self, path: &TargetPath) -> bool {
        !self.explicit.contains(path) && self.matched.insert(path.clone())
    }
}

/// Where a manifest lives, for error messages and relative `source` paths.
struct Origin<'a> {
    file: &'a str,
    base_dir: &'a Path,
}

impl Origin<'_> {
    fn invalid(&self, index: usize, message: impl Into<String>) -> ConfigError {
        ConfigError::InvalidResource {
            file: self.file.to_string(),
            index,
            message: message.into(),
        }
    }

    fn declaration(&self, index: usize, source: InvalidDeclaration) -> ConfigError {
        ConfigError::Declaration {
            file: self.file.to_string(),
            index,
            source,
        }
    }

    fn host(&self, index: usize, error: HostError) -> ConfigError {
        match error {
            HostError::Io { path, source } => ConfigError::Io {
                path: path.display().to_string(),
                source,
            },
            other => self.invalid(index, other.to_string()),
        }
    }
}

/// Load one manifest file.
///
/// The manifest id defaults to the file stem; `source` paths resolve
/// relative to the file's directory.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed, or any
/// resource is invalid.
pub fn load(path: &Path) -> Result<Manifest, ConfigError> {
    let doc: ManifestFile = toml_loader::load_required(path)?;
    let file = path.display().to_string();
    let stem = path
        .file_stem()
        .map_or_else(|| file.clone(), |s| s.to_string_lossy().into_owned());
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    convert(
        doc,
        &stem,
        &Origin {
            file: &file,
            base_dir,
        },
    )
}

/// Load several manifest files, preserving their order.
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered.
pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Manifest>, ConfigError> {
    paths.iter().map(|p| load(p.as_ref())).collect()
}

/// Parse manifest text.
///
/// `default_id` is used when the document has no `id`; `source` paths
/// resolve against `base_dir`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the text cannot be parsed or any resource is
/// invalid.
pub fn parse(text: &str, default_id: &str, base_dir: &Path) -> Result<Manifest, ConfigError> {
    let doc: ManifestFile = toml_loader::parse_str(text, default_id)?;
    convert(
        doc,
        default_id,
        &Origin {
            file: default_id,
            base_dir,
        },
    )
}

fn convert(doc: ManifestFile, default_id: &str, origin: &Origin<'_>) -> Result<Manifest, ConfigError> {
    let mut manifest = Manifest::new(doc.id.unwrap_or_else(|| default_id.to_string()));
    let mut claims = GlobClaims::new(&doc.resources);
    for (index, raw) in doc.resources.iter().enumerate() {
        push_resource(&mut manifest, raw, index, origin, &mut claims)?;
    }
    tracing::debug!(
        "loaded manifest '{}' with {} declaration(s)",
        manifest.id(),
        manifest.len()
    );
    Ok(manifest)
}

fn push_resource(
    manifest: &mut Manifest,
    raw: &RawResource,
    index: usize,
    origin: &Origin<'_>,
    claims: &mut GlobClaims,
) -> Result<(), ConfigError> {
    let allowed = raw.kind.allowed();
    if let Some(field) = raw.present().into_iter().find(|f| !allowed.contains(f)) {
        return Err(origin.invalid(
            index,
            format!("field '{field}' is not valid for a {}", raw.kind.name()),
        ));
    }

    let resources = if raw.is_glob() {
        glob_resources(raw, index, origin, claims)?
    } else {
        let host_path = (raw.kind == RawKind::FromHost)
            .then(|| host_source(raw, index, origin))
            .transpose()?;
        vec![(raw.path.clone(), to_resource(raw, host_path.as_deref(), index, origin)?)]
    };

    for (path, resource) in resources {
        manifest
            .push_requiring(&path, resource, &raw.requires)
            .map_err(|e| origin.declaration(index, e))?;
        for (name, value) in &raw.xattrs {
            manifest
                .push(&path, Xattr::new(name.clone(), value.clone()))
                .map_err(|e| origin.declaration(index, e))?;
        }
    }
    Ok(())
}

/// Host path named by `source`, relative to the manifest's directory.
fn host_source(raw: &RawResource, index: usize, origin: &Origin<'_>) -> Result<PathBuf, ConfigError> {
    raw.source
        .as_ref()
        .map(|source| origin.base_dir.join(source))
        .ok_or_else(|| origin.invalid(index, "from-host needs a source"))
}

/// One resource per glob match not claimed elsewhere, in match order.
fn glob_resources(
    raw: &RawResource,
    index: usize,
    origin: &Origin<'_>,
    claims: &mut GlobClaims,
) -> Result<Vec<(String, Resource)>, ConfigError> {
    let root = host_source(raw, index, origin)?;
    let pattern = raw.glob.as_deref().unwrap_or_default();
    let prefix = raw.path.trim_end_matches('/');

    let mut resources = Vec::new();
    for (relative, host_path) in host::expand(&root, pattern).map_err(|e| origin.host(index, e))? {
        let target = format!("{prefix}/{relative}");
        let claimed = TargetPath::parse(&target)
            .map(|path| claims.claim(&path))
            .map_err(|e| origin.declaration(index, e))?;
        if !claimed {
            tracing::debug!("glob match {target} is declared elsewhere, skipping");
            continue;
        }
        let resource = to_resource(raw, Some(&host_path), index, origin)?;
        resources.push((target, resource));
    }
    if resources.is_empty() {
        tracing::debug!("glob '{pattern}' in {} matched nothing", origin.file);
    }
    Ok(resources)
}

fn to_resource(
    raw: &RawResource,
    host_path: Option<&Path>,
    index: usize,
    origin: &Origin<'_>,
) -> Result<Resource, ConfigError> {
    let permissions = permissions(raw, index, origin)?;
    let entry = match raw.kind {
        RawKind::Directory => EntrySpec::directory(),
        RawKind::Fifo => EntrySpec::fifo(),
        RawKind::File => EntrySpec::file(file_content(raw, index, origin)?),
        RawKind::FromHost => {
            let host_path =
                host_path.ok_or_else(|| origin.invalid(index, "from-host needs a source"))?;
            host::read_entry(host_path).map_err(|e| origin.host(index, e))?
        }
        RawKind::Symlink => {
            let target = raw
                .target
                .clone()
                .ok_or_else(|| origin.invalid(index, "symlink needs a target"))?;
            EntrySpec::symlink(target)
        }
        RawKind::Device => {
            let (Some(class), Some(major), Some(minor)) = (raw.class, raw.major, raw.minor) else {
                return Err(origin.invalid(index, "device needs class, major and minor"));
            };
            EntrySpec::device(class, major, minor)
        }
        RawKind::Permissions => return Ok(Resource::Permissions(permissions)),
        RawKind::Xattr => {
            let name = raw
                .name
                .clone()
                .ok_or_else(|| origin.invalid(index, "xattr needs a name"))?;
            let value = match (&raw.value, &raw.value_base64) {
                (Some(value), None) => value.clone().into_bytes(),
                (None, Some(encoded)) => decode_base64(encoded, "value_base64", index, origin)?,
                _ => {
                    return Err(
                        origin.invalid(index, "xattr needs exactly one of value, value_base64")
                    );
                }
            };
            return Ok(Resource::Xattr(Xattr::new(name, value)));
        }
        RawKind::Absent => return Ok(Resource::Absent),
    };
    // Declared fields win over anything read from the host.
    let found = entry.permissions;
    Ok(Resource::Entry(EntrySpec {
        entry: entry.entry,
        permissions: Permissions {
            mode: permissions.mode.or(found.mode),
            owner: permissions.owner.or(found.owner),
            group: permissions.group.or(found.group),
        },
        mtime: raw.mtime.or(entry.mtime),
        atime: raw.atime.or(entry.atime),
    }))
}

fn permissions(
    raw: &RawResource,
    index: usize,
    origin: &Origin<'_>,
) -> Result<Permissions, ConfigError> {
    let mode = raw
        .mode
        .as_ref()
        .map(|mode| parse_mode(mode, &raw.path))
        .transpose()
        .map_err(|e| origin.declaration(index, e))?;
    Ok(Permissions {
        mode,
        owner: raw.owner.as_ref().map(clone_principal),
        group: raw.group.as_ref().map(clone_principal),
    })
}

fn clone_principal(raw: &RawPrincipal) -> Principal {
    match raw {
        RawPrincipal::Id(id) => Principal::id(*id),
        RawPrincipal::Name(name) => Principal::name(name.clone()),
        RawPrincipal::Full { name, id } => Principal {
            name: name.clone(),
            id: *id,
        },
    }
}

fn parse_mode(mode: &RawMode, path: &str) -> Result<Mode, InvalidDeclaration> {
    match mode {
        RawMode::Bits(bits) => {
            let bits = u32::try_from(*bits).map_err(|_| {
                InvalidDeclaration::new(path, "mode", format!("mode {bits} is out of range"))
            })?;
            Mode::new(bits, path)
        }
        RawMode::Octal(text) => Mode::parse_octal(text, path),
    }
}

fn file_content(raw: &RawResource, index: usize, origin: &Origin<'_>) -> Result<Vec<u8>, ConfigError> {
    match (&raw.content, &raw.content_base64, &raw.source) {
        (Some(text), None, None) => Ok(text.clone().into_bytes()),
        (None, Some(encoded), None) => decode_base64(encoded, "content_base64", index, origin),
        (None, None, Some(relative)) => {
            let full = origin.base_dir.join(relative);
            std::fs::read(&full).map_err(|source| ConfigError::Io {
                path: full.display().to_string(),
                source,
            })
        }
        _ => Err(origin.invalid(
            index,
            "file needs exactly one of content, content_base64, source",
        )),
    }
}

fn decode_base64(
    encoded: &str,
    field: &str,
    index: usize,
    origin: &Origin<'_>,
) -> Result<Vec<u8>, ConfigError> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| origin.invalid(index, format!("{field}: {e}")))
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
    use crate::config::test_helpers::write_temp_toml;
    use crate::resources::{Entry, Provenance, ResourceKind};

    fn parse_ok(text: &str) -> Manifest {
        parse(text, "test", Path::new(".")).unwrap()
    }

    fn parse_err(text: &str) -> ConfigError {
        parse(text, "test", Path::new(".")).unwrap_err()
    }

    fn entry(manifest: &Manifest, i: usize) -> &EntrySpec {
        match manifest.declarations()[i].resource() {
            Resource::Entry(spec) => spec,
            other => panic!("expected an entry, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    #[test]
    fn parses_ssh_manifest() {
        let m = parse_ok(
            r#"
id = "ssh"

[[resource]]
kind = "directory"
path = "/etc/ssh"
mode = 0o755

[[resource]]
kind = "file"
path = "/etc/ssh/sshd_config"
content = "B"
mode = "600"
owner = { name = "root", id = 0 }
group = 0
xattrs = { "user.managed" = "true" }
"#,
        );
        assert_eq!(m.id(), "ssh");
        assert_eq!(m.len(), 3);

        let dir = entry(&m, 0);
        assert_eq!(dir.entry, Entry::Directory);
        assert_eq!(dir.permissions.mode.unwrap().bits(), 0o755);

        let file = entry(&m, 1);
        assert_eq!(file.entry, Entry::File { content: b"B".to_vec() });
        assert_eq!(file.permissions.mode.unwrap().bits(), 0o600);
        assert_eq!(file.permissions.owner, Some(Principal::named("root", 0)));
        assert_eq!(file.permissions.group, Some(Principal::id(0)));

        let xattr = &m.declarations()[2];
        assert_eq!(
            xattr.path(),
            &TargetPath::parse("/etc/ssh/sshd_config").unwrap()
        );
        assert_eq!(
            xattr.resource(),
            &Resource::Xattr(Xattr::new("user.managed", "true"))
        );
        assert_eq!(xattr.provenance(), &Provenance::new("ssh", 2));
    }

    #[test]
    fn id_defaults_to_given_name() {
        let m = parse_ok("[[resource]]\nkind = \"fifo\"\npath = \"/run/ctl\"\n");
        assert_eq!(m.id(), "test");
        assert_eq!(m.declarations()[0].resource().kind(), ResourceKind::Fifo);
    }

    #[test]
    fn parses_links_devices_and_mtime() {
        let m = parse_ok(
            r#"
[[resource]]
kind = "symlink"
path = "/usr/bin/vi"
target = "vim"

[[resource]]
kind = "device"
path = "/dev/null"
class = "char"
major = 1
minor = 3
mtime = 1700000000
"#,
        );
        assert_eq!(
            entry(&m, 0).entry,
            Entry::Symlink {
                target: "vim".to_string()
            }
        );
        let dev = entry(&m, 1);
        assert_eq!(
            dev.entry,
            Entry::Device {
                class: DeviceClass::Char,
                major: 1,
                minor: 3
            }
        );
        assert_eq!(dev.mtime, Some(1_700_000_000));
        assert_eq!(dev.atime, None);
    }

    #[test]
    fn atime_is_parsed() {
        let m = parse_ok(
            "[[resource]]\nkind = \"file\"\npath = \"/x\"\ncontent = \"\"\natime = 1650000000\n",
        );
        assert_eq!(entry(&m, 0).atime, Some(1_650_000_000));
    }

    #[test]
    fn base64_content_is_decoded() {
        let m = parse_ok(
            "[[resource]]\nkind = \"file\"\npath = \"/bin/x\"\ncontent_base64 = \"AP8K\"\n",
        );
        assert_eq!(
            entry(&m, 0).entry,
            Entry::File {
                content: vec![0x00, 0xff, b'\n']
            }
        );
    }

    #[test]
    fn source_is_relative_to_manifest() {
        let (dir, path) = write_temp_toml(
            "[[resource]]\nkind = \"file\"\npath = \"/etc/motd\"\nsource = \"files/motd\"\n",
        );
        std::fs::create_dir(dir.path().join("files")).unwrap();
        std::fs::write(dir.path().join("files/motd"), "welcome\n").unwrap();

        let m = load(&path).unwrap();
        assert_eq!(m.id(), "manifest");
        assert_eq!(
            entry(&m, 0).entry,
            Entry::File {
                content: b"welcome\n".to_vec()
            }
        );
    }

    #[test]
    fn missing_source_is_io_error() {
        let (_dir, path) = write_temp_toml(
            "[[resource]]\nkind = \"file\"\npath = \"/etc/motd\"\nsource = \"nope\"\n",
        );
        assert!(matches!(load(&path).unwrap_err(), ConfigError::Io { .. }));
    }

    // -----------------------------------------------------------------------
    // Host entries
    // -----------------------------------------------------------------------

    #[cfg(unix)]
    fn host_tree(manifest: &str, files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf) {
        let (dir, path) = write_temp_toml(manifest);
        for (relative, content) in files {
            let file = dir.path().join(relative);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, content).unwrap();
        }
        (dir, path)
    }

    #[cfg(unix)]
    fn paths(manifest: &Manifest) -> Vec<&str> {
        manifest
            .declarations()
            .iter()
            .map(|d| d.path().as_str())
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn host_entry_takes_mode_and_mtime_from_the_host() {
        use std::os::unix::fs::PermissionsExt as _;

        let (dir, path) = host_tree(
            "[[resource]]\nkind = \"from-host\"\npath = \"/etc/motd\"\nsource = \"files/motd\"\nowner = \"root\"\n",
            &[("files/motd", "welcome\n")],
        );
        let host = dir.path().join("files/motd");
        std::fs::set_permissions(&host, std::fs::Permissions::from_mode(0o640)).unwrap();
        let host_mtime = {
            use std::os::unix::fs::MetadataExt as _;
            u64::try_from(std::fs::metadata(&host).unwrap().mtime()).unwrap()
        };

        let m = load(&path).unwrap();
        let spec = entry(&m, 0);
        assert_eq!(
            spec.entry,
            Entry::File {
                content: b"welcome\n".to_vec()
            }
        );
        assert_eq!(spec.permissions.mode.unwrap().bits(), 0o640);
        assert_eq!(spec.permissions.owner, Some(Principal::name("root")));
        assert_eq!(spec.mtime, Some(host_mtime));
        assert_eq!(spec.atime, None);
    }

    #[cfg(unix)]
    #[test]
    fn declared_fields_override_host_metadata() {
        let (_dir, path) = host_tree(
            "[[resource]]\nkind = \"from-host\"\npath = \"/etc/motd\"\nsource = \"files/motd\"\nmode = \"600\"\nmtime = 5\natime = 7\n",
            &[("files/motd", "welcome\n")],
        );
        let m = load(&path).unwrap();
        let spec = entry(&m, 0);
        assert_eq!(spec.permissions.mode.unwrap().bits(), 0o600);
        assert_eq!(spec.mtime, Some(5));
        assert_eq!(spec.atime, Some(7));
    }

    #[cfg(unix)]
    #[test]
    fn missing_host_path_is_io_error() {
        let (_dir, path) = write_temp_toml(
            "[[resource]]\nkind = \"from-host\"\npath = \"/etc/motd\"\nsource = \"nope\"\n",
        );
        assert!(matches!(load(&path).unwrap_err(), ConfigError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn glob_matches_land_under_the_target_prefix() {
        let (_dir, path) = host_tree(
            r#"
[[resource]]
kind = "from-host"
path = "/"
source = "rootfs"
glob = "etc/*.conf"
xattrs = { "user.origin" = "host" }
"#,
            &[
                ("rootfs/etc/b.conf", "b"),
                ("rootfs/etc/a.conf", "a"),
                ("rootfs/etc/notes.txt", "n"),
            ],
        );
        let m = load(&path).unwrap();
        assert_eq!(
            paths(&m),
            vec!["/etc/a.conf", "/etc/a.conf", "/etc/b.conf", "/etc/b.conf"]
        );
        assert_eq!(entry(&m, 0).entry, Entry::File { content: b"a".to_vec() });
        assert_eq!(
            m.declarations()[1].resource(),
            &Resource::Xattr(Xattr::new("user.origin", "host"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn glob_under_a_nested_prefix() {
        let (_dir, path) = host_tree(
            "[[resource]]\nkind = \"from-host\"\npath = \"/srv/www/\"\nsource = \"site\"\nglob = \"**/*.html\"\n",
            &[("site/index.html", "<html/>"), ("site/docs/a.html", "<a/>")],
        );
        let m = load(&path).unwrap();
        assert_eq!(paths(&m), vec!["/srv/www/docs/a.html", "/srv/www/index.html"]);
    }

    #[cfg(unix)]
    #[test]
    fn explicit_entries_win_over_glob_matches() {
        let (_dir, path) = host_tree(
            r#"
[[resource]]
kind = "from-host"
path = "/"
source = "rootfs"
glob = "etc/*.conf"

[[resource]]
kind = "from-host"
path = "/"
source = "rootfs"
glob = "etc/*"

[[resource]]
kind = "file"
path = "/etc/b.conf"
content = "mine"

[[resource]]
kind = "absent"
path = "/etc/gone.txt"
"#,
            &[
                ("rootfs/etc/a.conf", "a"),
                ("rootfs/etc/b.conf", "b"),
                ("rootfs/etc/gone.txt", "g"),
                ("rootfs/etc/notes.txt", "n"),
            ],
        );
        let m = load(&path).unwrap();
        assert_eq!(
            paths(&m),
            vec!["/etc/a.conf", "/etc/notes.txt", "/etc/b.conf", "/etc/gone.txt"]
        );
        assert_eq!(entry(&m, 2).entry, Entry::File { content: b"mine".to_vec() });
    }

    #[cfg(unix)]
    #[test]
    fn adjustments_do_not_hide_glob_matches() {
        let (_dir, path) = host_tree(
            r#"
[[resource]]
kind = "permissions"
path = "/etc/a.conf"
mode = "600"

[[resource]]
kind = "from-host"
path = "/"
source = "rootfs"
glob = "etc/*.conf"
"#,
            &[("rootfs/etc/a.conf", "a")],
        );
        let m = load(&path).unwrap();
        assert_eq!(paths(&m), vec!["/etc/a.conf", "/etc/a.conf"]);
        assert_eq!(m.declarations()[1].kind(), ResourceKind::RegularFile);
    }

    #[cfg(unix)]
    #[test]
    fn invalid_glob_is_an_invalid_resource() {
        let (_dir, path) = host_tree(
            "[[resource]]\nkind = \"from-host\"\npath = \"/\"\nsource = \"rootfs\"\nglob = \"a/***\"\n",
            &[("rootfs/a/x", "x")],
        );
        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidResource { index: 0, .. }), "{err:?}");
    }

    // -----------------------------------------------------------------------
    // Adjustments
    // -----------------------------------------------------------------------

    #[test]
    fn parses_adjustments_removals_and_requires() {
        let m = parse_ok(
            r#"
[[resource]]
kind = "permission-set"
path = "/srv"
owner = "www"

[[resource]]
kind = "xattr"
path = "/srv"
name = "user.bin"
value_base64 = "AAE="

[[resource]]
kind = "absent"
path = "/etc/old.conf"
requires = ["/srv"]
"#,
        );
        assert_eq!(
            m.declarations()[0].resource(),
            &Resource::Permissions(Permissions::new().with_owner(Principal::name("www")))
        );
        assert_eq!(
            m.declarations()[1].resource(),
            &Resource::Xattr(Xattr::new("user.bin", vec![0u8, 1]))
        );
        assert_eq!(m.declarations()[2].resource(), &Resource::Absent);
        assert_eq!(
            m.declarations()[2].requires(),
            vec![TargetPath::parse("/srv").unwrap()]
        );
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_kind_is_a_syntax_error() {
        let err = parse_err("[[resource]]\nkind = \"package\"\npath = \"/x\"\n");
        assert!(matches!(err, ConfigError::InvalidSyntax { .. }));
    }

    #[test]
    fn unknown_field_is_a_syntax_error() {
        let err = parse_err("[[resource]]\nkind = \"fifo\"\npath = \"/x\"\ncolour = 1\n");
        assert!(matches!(err, ConfigError::InvalidSyntax { .. }));
    }

    #[test]
    fn field_foreign_to_kind_is_rejected() {
        let err = parse_err("[[resource]]\nkind = \"directory\"\npath = \"/x\"\ntarget = \"y\"\n");
        let ConfigError::InvalidResource { index, message, .. } = err else {
            panic!("expected InvalidResource, got {err:?}");
        };
        assert_eq!(index, 0);
        assert!(message.contains("'target'"), "{message}");
    }

    #[test]
    fn file_needs_exactly_one_content_source() {
        let err = parse_err(
            "[[resource]]\nkind = \"file\"\npath = \"/x\"\ncontent = \"a\"\ncontent_base64 = \"YQ==\"\n",
        );
        assert!(matches!(err, ConfigError::InvalidResource { .. }));
        let err = parse_err("[[resource]]\nkind = \"file\"\npath = \"/x\"\n");
        assert!(matches!(err, ConfigError::InvalidResource { .. }));
    }

    #[test]
    fn invalid_mode_reports_declaration_error() {
        let err = parse_err(
            "[[resource]]\nkind = \"fifo\"\npath = \"/a\"\n\n[[resource]]\nkind = \"directory\"\npath = \"/x\"\nmode = \"789\"\n",
        );
        let ConfigError::Declaration { index, source, .. } = err else {
            panic!("expected Declaration, got {err:?}");
        };
        assert_eq!(index, 1);
        assert_eq!(source.field, "mode");
    }

    #[test]
    fn glob_is_only_valid_for_host_entries() {
        let err = parse_err(
            "[[resource]]\nkind = \"file\"\npath = \"/x\"\ncontent = \"\"\nglob = \"*\"\n",
        );
        assert!(err.to_string().contains("field 'glob' is not valid for a file"), "{err}");
    }

    #[test]
    fn host_entry_needs_a_source() {
        let err = parse_err("[[resource]]\nkind = \"from-host\"\npath = \"/x\"\n");
        assert!(err.to_string().contains("from-host needs a source"), "{err}");
    }

    #[test]
    fn relative_path_reports_declaration_error() {
        let err = parse_err("[[resource]]\nkind = \"directory\"\npath = \"etc\"\n");
        assert!(matches!(err, ConfigError::Declaration { .. }));
    }

    #[test]
    fn bad_base64_is_rejected() {
        let err = parse_err(
            "[[resource]]\nkind = \"file\"\npath = \"/x\"\ncontent_base64 = \"!!\"\n",
        );
        let ConfigError::InvalidResource { message, .. } = err else {
            panic!("expected InvalidResource, got {err:?}");
        };
        assert!(message.starts_with("content_base64: "), "{message}");
    }
}
