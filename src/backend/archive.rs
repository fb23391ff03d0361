//! Archive backend: POSIX ustar entries with PAX extended headers.
//!
//! One entry per resolved node, in resolved order.  Names are relative to the
//! extraction root, so `tar -x --xattrs -C / -f bundle.tar` realizes the
//! declared state.  Permission-set adjustments were folded into the entry by
//! the graph builder; extended attributes travel as `SCHILY.xattr.*` records
//! in a PAX header immediately before their entry.
use std::io::{self, Write};

use tar::{EntryType, Header};

use super::error::{BackendError, RenderError, UnsupportedOperation};
use super::pax::PaxRecords;
use super::Backend;
use crate::graph::{NodeState, ResolvedSequence, ResourceNode};
use crate::resources::{DeviceClass, Entry, EntrySpec, Mode, Principal, TargetPath};

/// Largest value of an 8-byte octal header field (uid, gid, device numbers).
const OCTAL8_MAX: u64 = 0o7_777_777;

/// Largest value of a 12-byte octal header field (size, mtime).
const OCTAL12_MAX: u64 = 0o77_777_777_777;

const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const LINKNAME_LEN: usize = 100;
const OWNER_NAME_LEN: usize = 32;

/// Largest extended attribute value accepted (Linux `XATTR_SIZE_MAX`).
pub const XATTR_VALUE_MAX: usize = 65_536;

/// Longest extended attribute name accepted (Linux `XATTR_NAME_MAX`).
pub const XATTR_NAME_MAX: usize = 255;

/// Settings for the archive backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Modification time for entries that do not declare one.
    pub mtime: u64,
}

/// Renders a resolved sequence as an uncompressed tar stream.
///
/// # Examples
///
/// ```
/// use confbundler::backend::{ArchiveBackend, Backend};
/// use confbundler::graph::{BuildOptions, build, resolve};
/// use confbundler::resources::{EntrySpec, Manifest};
///
/// let mut manifest = Manifest::new("motd");
/// manifest.push("/etc/motd", EntrySpec::file("hello\n")).unwrap();
/// let sequence = resolve(build(manifest, BuildOptions::default()).unwrap()).unwrap();
///
/// let mut out = Vec::new();
/// ArchiveBackend::default().render(&sequence, &mut out).unwrap();
/// assert_eq!(out.len() % 512, 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveBackend {
    options: ArchiveOptions,
}

impl ArchiveBackend {
    /// Create a backend with the given options.
    #[must_use]
    pub const fn new(options: ArchiveOptions) -> Self {
        Self { options }
    }

    fn check(node: &ResourceNode) -> Result<(), BackendError> {
        let spec = match &node.state {
            NodeState::Declared(spec) | NodeState::Implicit(spec) => spec,
            NodeState::Absent => {
                return Err(UnsupportedOperation {
                    operation: "remove",
                    path: node.path.clone(),
                    backend: "archive",
                }
                .into());
            }
        };

        for (name, value) in &node.xattrs {
            if name.len() > XATTR_NAME_MAX {
                return Err(RenderError::unencodable(
                    &node.path,
                    format!(
                        "extended attribute name is {} bytes, limit is {XATTR_NAME_MAX}",
                        name.len()
                    ),
                )
                .into());
            }
            if value.len() > XATTR_VALUE_MAX {
                return Err(RenderError::unencodable(
                    &node.path,
                    format!(
                        "extended attribute '{name}' is {} bytes, limit is {XATTR_VALUE_MAX}",
                        value.len()
                    ),
                )
                .into());
            }
        }

        if let Entry::Device { major, minor, .. } = spec.entry
            && (u64::from(major) > OCTAL8_MAX || u64::from(minor) > OCTAL8_MAX)
        {
            return Err(RenderError::unencodable(
                &node.path,
                format!("device numbers {major}:{minor} exceed {OCTAL8_MAX:o}"),
            )
            .into());
        }
        Ok(())
    }

    fn append<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        node: &ResourceNode,
        spec: &EntrySpec,
    ) -> Result<(), RenderError> {
        let path = &node.path;
        let mut pax = PaxRecords::new();
        for (name, value) in &node.xattrs {
            pax.insert_xattr(name, value);
        }

        let mut header = Header::new_ustar();
        let data: &[u8] = match &spec.entry {
            Entry::File { content } => content,
            Entry::Directory | Entry::Symlink { .. } | Entry::Fifo | Entry::Device { .. } => &[],
        };
        header.set_entry_type(entry_type(&spec.entry));
        header.set_mode(
            spec.permissions
                .mode
                .map_or_else(|| default_mode(&spec.entry), Mode::bits),
        );

        let mtime = spec.mtime.unwrap_or(self.options.mtime);
        header.set_mtime(fit(&mut pax, "mtime", mtime, OCTAL12_MAX));
        if let Some(atime) = spec.atime {
            pax.insert("atime", atime.to_string());
        }
        let size = u64::try_from(data.len()).unwrap_or(u64::MAX);
        header.set_size(fit(&mut pax, "size", size, OCTAL12_MAX));

        let (uid, uname) = principal(spec.permissions.owner.as_ref());
        let (gid, gname) = principal(spec.permissions.group.as_ref());
        header.set_uid(fit(&mut pax, "uid", uid, OCTAL8_MAX));
        header.set_gid(fit(&mut pax, "gid", gid, OCTAL8_MAX));

        if let Entry::Device { major, minor, .. } = spec.entry {
            header
                .set_device_major(major)
                .map_err(|e| RenderError::unencodable(path, e.to_string()))?;
            header
                .set_device_minor(minor)
                .map_err(|e| RenderError::unencodable(path, e.to_string()))?;
        }

        let name = entry_name(path, &spec.entry);
        let ustar = header
            .as_ustar_mut()
            .ok_or_else(|| RenderError::unencodable(path, "header is not ustar"))?;
        if let Some((prefix, short)) = split_name(name.as_bytes()) {
            copy_field(&mut ustar.prefix, prefix);
            copy_field(&mut ustar.name, short);
        } else {
            pax.insert("path", name.as_bytes());
            copy_field(&mut ustar.name, name.as_bytes());
        }
        if let Entry::Symlink { target } = &spec.entry {
            if target.len() > LINKNAME_LEN {
                pax.insert("linkpath", target.as_bytes());
            }
            copy_field(&mut ustar.linkname, target.as_bytes());
        }
        if uname.len() > OWNER_NAME_LEN {
            pax.insert("uname", uname.as_bytes());
        } else {
            copy_field(&mut ustar.uname, uname.as_bytes());
        }
        if gname.len() > OWNER_NAME_LEN {
            pax.insert("gname", gname.as_bytes());
        } else {
            copy_field(&mut ustar.gname, gname.as_bytes());
        }
        header.set_cksum();

        if !pax.is_empty() {
            append_pax(builder, path, &pax, mtime)?;
        }
        tracing::debug!("archive entry {name}");
        builder
            .append(&header, data)
            .map_err(|e| RenderError::io(path, e))
    }
}

impl Backend for ArchiveBackend {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn validate(&self, sequence: &ResolvedSequence) -> Result<(), BackendError> {
        sequence.iter().try_for_each(Self::check)
    }

    fn render(
        &self,
        sequence: &ResolvedSequence,
        sink: &mut dyn Write,
    ) -> Result<(), BackendError> {
        self.validate(sequence)?;

        let mut builder = tar::Builder::new(Fused::new(sink));
        for node in sequence {
            let Some(spec) = node.state.entry() else {
                continue;
            };
            if skips_root(node, spec) {
                continue;
            }
            self.append(&mut builder, node, spec)?;
        }
        builder.into_inner().map_err(RenderError::Finish)?;
        Ok(())
    }
}

/// Sink wrapper that refuses all writes once one has failed.
///
/// `tar::Builder` writes the end-of-archive blocks when dropped, so a render
/// that stops on an error would otherwise leave a stream that looks complete.
struct Fused<W> {
    inner: W,
    failed: bool,
}

impl<W: Write> Fused<W> {
    const fn new(inner: W) -> Self {
        Self {
            inner,
            failed: false,
        }
    }

    fn check<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result
            && e.kind() != io::ErrorKind::Interrupted
        {
            self.failed = true;
        }
        result
    }

    fn refuse(&self) -> io::Result<()> {
        if self.failed {
            Err(io::Error::other("archive sink failed earlier"))
        } else {
            Ok(())
        }
    }
}

impl<W: Write> Write for Fused<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.refuse()?;
        let result = self.inner.write(buf);
        self.check(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.refuse()?;
        let result = self.inner.flush();
        self.check(result)
    }
}

/// An implicit root with nothing to say about itself is left to the
/// extraction directory.
fn skips_root(node: &ResourceNode, spec: &EntrySpec) -> bool {
    node.path.is_root() && node.is_implicit() && node.xattrs.is_empty() && spec.permissions.is_empty()
}

const fn entry_type(entry: &Entry) -> EntryType {
    match entry {
        Entry::Directory => EntryType::Directory,
        Entry::File { .. } => EntryType::Regular,
        Entry::Symlink { .. } => EntryType::Symlink,
        Entry::Fifo => EntryType::Fifo,
        Entry::Device {
            class: DeviceClass::Char,
            ..
        } => EntryType::Char,
        Entry::Device {
            class: DeviceClass::Block,
            ..
        } => EntryType::Block,
    }
}

/// Mode used when neither the entry nor a permission-set gives one.
#[must_use]
pub const fn default_mode(entry: &Entry) -> u32 {
    match entry {
        Entry::Directory => 0o755,
        Entry::Symlink { .. } => 0o777,
        Entry::File { .. } | Entry::Fifo | Entry::Device { .. } => 0o644,
    }
}

/// Archive member name: relative, directories with a trailing `/`, the root
/// as `./`.
fn entry_name(path: &TargetPath, entry: &Entry) -> String {
    match entry {
        Entry::Directory => format!("{}/", path.relative()),
        Entry::File { .. } | Entry::Symlink { .. } | Entry::Fifo | Entry::Device { .. } => {
            path.relative().to_string()
        }
    }
}

/// Numeric id and name for a principal; unset means id 0 and no name.
fn principal(principal: Option<&Principal>) -> (u64, String) {
    principal.map_or_else(
        || (0, String::new()),
        |p| (p.id.unwrap_or(0), p.name.clone().unwrap_or_default()),
    )
}

/// Value for a numeric header field; anything above `max` moves to a PAX
/// record and the field is zeroed.
fn fit(pax: &mut PaxRecords, key: &str, value: u64, max: u64) -> u64 {
    if value > max {
        pax.insert(key, value.to_string());
        0
    } else {
        value
    }
}

/// Split a member name into ustar `prefix` and `name` fields, or `None` if
/// it cannot be represented without a PAX `path` record.
fn split_name(name: &[u8]) -> Option<(&[u8], &[u8])> {
    if name.len() <= NAME_LEN {
        return Some((&[], name));
    }
    name.iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'/')
        .map(|(i, _)| i)
        .filter(|&i| i <= PREFIX_LEN)
        .find_map(|i| {
            let prefix = name.get(..i)?;
            let rest = name.get(i + 1..)?;
            (!rest.is_empty() && rest.len() <= NAME_LEN).then_some((prefix, rest))
        })
}

fn copy_field(field: &mut [u8], bytes: &[u8]) {
    for (dst, src) in field.iter_mut().zip(bytes) {
        *dst = *src;
    }
}

fn append_pax<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &TargetPath,
    records: &PaxRecords,
    mtime: u64,
) -> Result<(), RenderError> {
    let data = records.encode();
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::XHeader);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(mtime.min(OCTAL12_MAX));
    header.set_size(u64::try_from(data.len()).unwrap_or(u64::MAX));

    let base = if path.is_root() { "." } else { path.file_name() };
    let name = format!("PaxHeaders/{base}");
    let ustar = header
        .as_ustar_mut()
        .ok_or_else(|| RenderError::unencodable(path, "header is not ustar"))?;
    copy_field(&mut ustar.name, name.as_bytes());
    header.set_cksum();

    builder
        .append(&header, data.as_slice())
        .map_err(|e| RenderError::io(path, e))
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::graph::{BuildOptions, build, resolve};
    use crate::resources::{Manifest, Permissions, Resource, Xattr};

    const BLOCK: usize = 512;

    fn sequence(manifest: Manifest) -> ResolvedSequence {
        resolve(build(manifest, BuildOptions::default()).unwrap()).unwrap()
    }

    fn render(manifest: Manifest) -> Vec<u8> {
        let mut out = Vec::new();
        ArchiveBackend::default()
            .render(&sequence(manifest), &mut out)
            .unwrap();
        out
    }

    /// (path, entry type, mode, content) for every non-PAX member.
    fn members(bytes: &[u8]) -> Vec<(String, EntryType, u32, Vec<u8>)> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let path = entry.path().unwrap().to_string_lossy().into_owned();
                let kind = entry.header().entry_type();
                let mode = entry.header().mode().unwrap();
                let mut content = Vec::new();
                entry.read_to_end(&mut content).unwrap();
                (path, kind, mode, content)
            })
            .collect()
    }

    /// Raw name field of the header block starting at `offset`.
    fn raw_name(bytes: &[u8], offset: usize) -> String {
        let field = &bytes[offset..offset + NAME_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    #[test]
    fn directory_and_file_entries() {
        let mut m = Manifest::new("m");
        m.push("/etc/ssh", EntrySpec::directory().with_mode(0o755))
            .unwrap();
        m.push("/etc/ssh/sshd_config", EntrySpec::file("B").with_mode(0o600))
            .unwrap();
        let out = render(m);

        let members = members(&out);
        let summary: Vec<(&str, EntryType, u32)> = members
            .iter()
            .map(|(p, k, m, _)| (p.as_str(), *k, *m))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("etc/", EntryType::Directory, 0o755),
                ("etc/ssh/", EntryType::Directory, 0o755),
                ("etc/ssh/sshd_config", EntryType::Regular, 0o600),
            ]
        );
        assert_eq!(members[2].3, b"B".to_vec());
    }

    #[test]
    fn implicit_root_is_not_emitted() {
        let mut m = Manifest::new("m");
        m.push("/motd", EntrySpec::file("hi")).unwrap();
        let out = render(m);
        assert_eq!(raw_name(&out, 0), "motd");
    }

    #[test]
    fn explicit_root_is_dot_slash() {
        let mut m = Manifest::new("m");
        m.push("/", EntrySpec::directory().with_mode(0o755)).unwrap();
        m.push("/motd", EntrySpec::file("hi")).unwrap();
        let out = render(m);
        assert_eq!(raw_name(&out, 0), "./");
    }

    #[test]
    fn symlink_has_target_and_no_body() {
        let mut m = Manifest::new("m");
        m.push("/usr/bin/vi", EntrySpec::symlink("vim")).unwrap();
        let out = render(m);
        let mut archive = tar::Archive::new(out.as_slice());
        let entry = archive
            .entries()
            .unwrap()
            .map(Result::unwrap)
            .find(|e| e.header().entry_type() == EntryType::Symlink)
            .unwrap();
        assert_eq!(entry.header().size().unwrap(), 0);
        assert_eq!(entry.header().mode().unwrap(), 0o777);
        assert_eq!(
            entry.link_name().unwrap().unwrap().to_string_lossy(),
            "vim"
        );
    }

    #[test]
    fn fifo_and_device_entries() {
        let mut m = Manifest::new("m");
        m.push("/dev/console", EntrySpec::device(DeviceClass::Char, 5, 1))
            .unwrap();
        m.push("/run/pipe", EntrySpec::fifo()).unwrap();
        let out = render(m);

        let mut archive = tar::Archive::new(out.as_slice());
        let headers: Vec<Header> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().header().clone())
            .collect();
        let console = headers
            .iter()
            .find(|h| h.entry_type() == EntryType::Char)
            .unwrap();
        assert_eq!(console.device_major().unwrap(), Some(5));
        assert_eq!(console.device_minor().unwrap(), Some(1));
        assert!(headers.iter().any(|h| h.entry_type() == EntryType::Fifo));
    }

    #[test]
    fn ownership_by_name_and_id() {
        let mut m = Manifest::new("m");
        m.push(
            "/srv/www",
            EntrySpec::directory()
                .with_owner(Principal::named("www-data", 33))
                .with_group(Principal::id(33)),
        )
        .unwrap();
        let out = render(m);
        let mut archive = tar::Archive::new(out.as_slice());
        let entry = archive
            .entries()
            .unwrap()
            .map(Result::unwrap)
            .find(|e| e.path().unwrap().to_string_lossy() == "srv/www/")
            .unwrap();
        let header = entry.header();
        assert_eq!(header.uid().unwrap(), 33);
        assert_eq!(header.username().unwrap(), Some("www-data"));
        assert_eq!(header.gid().unwrap(), 33);
        assert_eq!(header.groupname().unwrap(), Some(""));
    }

    #[test]
    fn mtime_comes_from_options_unless_declared() {
        let mut m = Manifest::new("m");
        m.push("/a", EntrySpec::file("a")).unwrap();
        m.push("/b", EntrySpec::file("b").with_mtime(1_700_000_000))
            .unwrap();
        let backend = ArchiveBackend::new(ArchiveOptions { mtime: 42 });
        let mut out = Vec::new();
        backend.render(&sequence(m), &mut out).unwrap();

        let mut archive = tar::Archive::new(out.as_slice());
        let mtimes: Vec<u64> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().header().mtime().unwrap())
            .collect();
        assert_eq!(mtimes, vec![42, 1_700_000_000]);
    }

    #[test]
    fn stream_ends_with_two_zero_blocks() {
        let mut m = Manifest::new("m");
        m.push("/etc/motd", EntrySpec::file("hello\n")).unwrap();
        let out = render(m);
        assert_eq!(out.len() % BLOCK, 0);
        assert!(out[out.len() - 2 * BLOCK..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_sequence_is_just_the_trailer() {
        let mut out = Vec::new();
        ArchiveBackend::default()
            .render(&ResolvedSequence::default(), &mut out)
            .unwrap();
        assert_eq!(out, vec![0; 2 * BLOCK]);
    }

    // -----------------------------------------------------------------------
    // PAX headers
    // -----------------------------------------------------------------------

    #[test]
    fn xattrs_precede_their_entry_in_a_pax_header() {
        let mut m = Manifest::new("m");
        m.push("/motd", EntrySpec::file("B")).unwrap();
        m.push("/motd", Xattr::new("user.managed", "true")).unwrap();
        let out = render(m);

        assert_eq!(out[156], b'x');
        assert_eq!(raw_name(&out, 0), "PaxHeaders/motd");
        let body = &out[BLOCK..2 * BLOCK];
        assert!(body.starts_with(b"34 SCHILY.xattr.user.managed=true\n"));
        assert_eq!(raw_name(&out, 2 * BLOCK), "motd");

        let mut archive = tar::Archive::new(out.as_slice());
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        let records: Vec<(String, Vec<u8>)> = entry
            .pax_extensions()
            .unwrap()
            .unwrap()
            .map(|r| {
                let r = r.unwrap();
                (r.key().unwrap().to_string(), r.value_bytes().to_vec())
            })
            .collect();
        assert_eq!(
            records,
            vec![("SCHILY.xattr.user.managed".to_string(), b"true".to_vec())]
        );
    }

    #[test]
    fn long_path_uses_ustar_prefix() {
        let dir = format!("/{}", "d".repeat(80));
        let file = format!("{dir}/{}", "f".repeat(60));
        let mut m = Manifest::new("m");
        m.push(&file, EntrySpec::file("x")).unwrap();
        let out = render(m);

        let names: Vec<String> = members(&out).into_iter().map(|(p, ..)| p).collect();
        assert_eq!(names[1], file.trim_start_matches('/'));
        // no PAX header was needed for either member
        assert!(out.chunks(BLOCK).all(|b| b.len() < 157 || b[156] != b'x'));
    }

    #[test]
    fn overlong_path_uses_pax_path() {
        let file = format!("/{}", "f".repeat(180));
        let mut m = Manifest::new("m");
        m.push(&file, EntrySpec::file("x")).unwrap();
        let out = render(m);
        assert_eq!(out[156], b'x');
        let names: Vec<String> = members(&out).into_iter().map(|(p, ..)| p).collect();
        assert_eq!(names, vec![file.trim_start_matches('/').to_string()]);
    }

    #[test]
    fn large_uid_uses_pax_record() {
        let mut m = Manifest::new("m");
        m.push("/x", EntrySpec::file("x").with_owner(Principal::id(4_000_000_000)))
            .unwrap();
        let out = render(m);
        let body = String::from_utf8_lossy(&out[BLOCK..2 * BLOCK]).into_owned();
        assert!(body.contains("uid=4000000000\n"));
    }

    #[test]
    fn atime_is_a_pax_record() {
        let mut m = Manifest::new("m");
        m.push("/x", EntrySpec::file("x").with_atime(1_650_000_000))
            .unwrap();
        let out = render(m);
        assert_eq!(out[156], b'x');
        let body = String::from_utf8_lossy(&out[BLOCK..2 * BLOCK]).into_owned();
        assert!(body.contains("atime=1650000000\n"), "{body}");
    }

    #[test]
    fn no_atime_without_a_declared_one() {
        let mut m = Manifest::new("m");
        m.push("/x", EntrySpec::file("x")).unwrap();
        let out = render(m);
        assert_eq!(raw_name(&out, 0), "x");
    }

    // -----------------------------------------------------------------------
    // Sink failures
    // -----------------------------------------------------------------------

    /// Accepts writes until `limit` bytes, fails once, then accepts again.
    struct FlakySink {
        out: Vec<u8>,
        limit: usize,
        tripped: bool,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.tripped && self.out.len() + buf.len() > self.limit {
                self.tripped = true;
                return Err(io::Error::other("disk full"));
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_leaves_no_end_of_archive_marker() {
        let mut m = Manifest::new("m");
        m.push("/a", EntrySpec::file(vec![b'a'; 1500])).unwrap();
        m.push("/b", EntrySpec::file(vec![b'b'; 3000])).unwrap();
        let mut sink = FlakySink {
            out: Vec::new(),
            limit: 4 * BLOCK,
            tripped: false,
        };

        let err = ArchiveBackend::default()
            .render(&sequence(m), &mut sink)
            .unwrap_err();
        assert!(matches!(err, BackendError::Render(RenderError::Io { .. })), "{err:?}");
        assert!(sink.tripped);
        assert_eq!(sink.out.len(), 4 * BLOCK);
        assert!(!sink.out[sink.out.len() - 2 * BLOCK..].iter().all(|&b| b == 0));
    }

    #[test]
    fn fused_writer_refuses_after_a_failure() {
        let mut sink = FlakySink {
            out: Vec::new(),
            limit: 4,
            tripped: false,
        };
        let mut fused = Fused::new(&mut sink);
        fused.write_all(b"abcd").unwrap();
        assert!(fused.write_all(b"e").is_err());
        assert!(fused.write_all(b"f").is_err());
        assert!(fused.flush().is_err());
        assert_eq!(sink.out, b"abcd");
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn removal_is_rejected_before_writing() {
        let mut m = Manifest::new("m");
        m.push("/etc/motd", EntrySpec::file("hi")).unwrap();
        m.push("/etc/old.conf", Resource::Absent).unwrap();
        let seq = sequence(m);

        let mut out = Vec::new();
        let err = ArchiveBackend::default().render(&seq, &mut out).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Unsupported(UnsupportedOperation {
                operation: "remove",
                ..
            })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn oversized_xattr_value_is_a_render_error() {
        let mut m = Manifest::new("m");
        m.push("/x", EntrySpec::file("x")).unwrap();
        m.push("/x", Xattr::new("user.big", vec![0u8; XATTR_VALUE_MAX + 1]))
            .unwrap();
        let seq = sequence(m);
        let err = ArchiveBackend::default().validate(&seq).unwrap_err();
        match err {
            BackendError::Render(RenderError::Unencodable { path, .. }) => {
                assert_eq!(path.as_str(), "/x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn overlong_xattr_name_is_a_render_error() {
        let mut m = Manifest::new("m");
        m.push("/x", EntrySpec::file("x")).unwrap();
        m.push("/x", Xattr::new(format!("user.{}", "n".repeat(260)), "v"))
            .unwrap();
        assert!(ArchiveBackend::default().validate(&sequence(m)).is_err());
    }

    #[test]
    fn oversized_device_number_is_a_render_error() {
        let mut m = Manifest::new("m");
        m.push("/dev/big", EntrySpec::device(DeviceClass::Block, u32::MAX, 0))
            .unwrap();
        assert!(ArchiveBackend::default().validate(&sequence(m)).is_err());
    }

    #[test]
    fn adjusted_implicit_root_is_emitted() {
        let mut m = Manifest::new("m");
        m.push("/", Permissions::new().with_mode(0o755)).unwrap();
        m.push("/motd", EntrySpec::file("hi")).unwrap();
        let out = render(m);
        assert_eq!(raw_name(&out, 0), "./");
    }

    #[test]
    fn rendering_is_deterministic() {
        let make = || {
            let mut m = Manifest::new("m");
            m.push("/etc/ssh/sshd_config", EntrySpec::file("B")).unwrap();
            m.push("/etc/ssh/sshd_config", Xattr::new("user.b", "2"))
                .unwrap();
            m.push("/etc/ssh/sshd_config", Xattr::new("user.a", "1"))
                .unwrap();
            m
        };
        assert_eq!(render(make()), render(make()));
    }
}
