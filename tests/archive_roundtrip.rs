#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! End-to-end tests: declarations in, archive bytes out, read back through
//! the `tar` crate the way an extractor would.

mod common;

use common::{member, read_archive};
use confbundler::backend::{ArchiveBackend, ArchiveOptions};
use confbundler::graph::ConflictReason;
use confbundler::resources::{
    DeviceClass, EntrySpec, Manifest, Permissions, Principal, Provenance, Resource, TargetPath,
    Xattr, manifest,
};
use confbundler::{CompileOptions, Compiler, Error, compile_to_vec};
use tar::EntryType;

fn archive(manifests: Vec<Manifest>) -> Vec<u8> {
    compile_to_vec(
        manifest::concat(manifests),
        CompileOptions::default(),
        &ArchiveBackend::default(),
    )
    .unwrap()
    .bytes
}

fn ssh_manifest() -> Manifest {
    let mut m = Manifest::new("ssh");
    m.push("/etc/ssh", EntrySpec::directory().with_mode(0o755))
        .unwrap();
    m.push("/etc/ssh/sshd_config", EntrySpec::file("B").with_mode(0o600))
        .unwrap();
    m.push("/etc/ssh/sshd_config", Xattr::new("user.managed", "true"))
        .unwrap();
    m
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn ssh_directory_file_and_xattr() {
    let members = read_archive(&archive(vec![ssh_manifest()]));

    let dir = member(&members, "etc/ssh/");
    assert_eq!(dir.kind, EntryType::Directory);
    assert_eq!(dir.mode, 0o755);

    let file = member(&members, "etc/ssh/sshd_config");
    assert_eq!(file.kind, EntryType::Regular);
    assert_eq!(file.mode, 0o600);
    assert_eq!(file.content, b"B");
    assert_eq!(
        file.xattrs().get("user.managed").map(Vec::as_slice),
        Some(b"true".as_slice())
    );
    assert!(dir.xattrs().is_empty());
}

#[test]
fn later_manifest_wins_and_both_are_recorded() {
    let mut a = Manifest::new("a");
    a.push("/etc/motd", EntrySpec::file("A")).unwrap();
    let mut b = Manifest::new("b");
    b.push("/etc/motd", EntrySpec::file("B")).unwrap();

    let compiler = Compiler::default().with_manifest(a).with_manifest(b);
    let artifact = compiler.compile_to_vec(&ArchiveBackend::default()).unwrap();
    assert_eq!(
        member(&read_archive(&artifact.bytes), "etc/motd").content,
        b"B"
    );

    let sequence = compiler.resolve().unwrap();
    assert_eq!(
        sequence.provenance(&TargetPath::parse("/etc/motd").unwrap()),
        &[Provenance::new("a", 0), Provenance::new("b", 0)]
    );
    assert_eq!(artifact.warnings.len(), 1);
}

#[test]
fn creation_after_removal_is_a_conflict() {
    let mut m = Manifest::new("m");
    m.push("/etc/old.conf", Resource::Absent).unwrap();
    m.push("/etc/old.conf", EntrySpec::file("new")).unwrap();

    let err = compile_to_vec(
        m.into_declarations(),
        CompileOptions::default(),
        &ArchiveBackend::default(),
    )
    .unwrap_err();
    let Error::Conflict(conflict) = err else {
        panic!("expected a conflict, got {err:?}");
    };
    assert_eq!(conflict.first, Provenance::new("m", 0));
    assert_eq!(conflict.second, Provenance::new("m", 1));
    assert!(matches!(
        conflict.reason,
        ConflictReason::DeclaredAfterRemoval { .. }
    ));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn compilation_is_deterministic() {
    let first = archive(vec![ssh_manifest()]);
    let second = archive(vec![ssh_manifest()]);
    assert_eq!(first, second);
}

#[test]
fn duplicated_input_yields_identical_output() {
    let once = archive(vec![ssh_manifest()]);
    let twice = archive(vec![ssh_manifest(), ssh_manifest()]);
    assert_eq!(once, twice);
}

#[test]
fn directory_and_file_at_one_path_conflict() {
    let mut m = Manifest::new("m");
    m.push("/etc/x", EntrySpec::directory()).unwrap();
    m.push("/etc/x", EntrySpec::file("x")).unwrap();
    let err = compile_to_vec(
        m.into_declarations(),
        CompileOptions::default(),
        &ArchiveBackend::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "{err:?}");
}

#[test]
fn missing_ancestors_are_synthesized_in_order() {
    let mut m = Manifest::new("m");
    m.push("/a/b/c", EntrySpec::file("c")).unwrap();
    let members = read_archive(&archive(vec![m]));
    let names: Vec<&str> = members.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(names, vec!["a/", "a/b/", "a/b/c"]);
    assert!(members[..2].iter().all(|m| m.kind == EntryType::Directory));
    assert!(members[..2].iter().all(|m| m.mode == 0o755));
}

#[test]
fn every_entry_follows_its_parent() {
    let mut m = Manifest::new("m");
    m.push("/srv/www/index.html", EntrySpec::file("<html/>"))
        .unwrap();
    m.push("/etc/hosts", EntrySpec::file("127.0.0.1 localhost\n"))
        .unwrap();
    m.push("/srv", EntrySpec::directory().with_mode(0o750))
        .unwrap();
    m.push("/etc", EntrySpec::directory()).unwrap();
    let members = read_archive(&archive(vec![m]));
    for (i, entry) in members.iter().enumerate() {
        let trimmed = entry.path.trim_end_matches('/');
        if let Some((parent, _)) = trimmed.rsplit_once('/') {
            let parent = format!("{parent}/");
            let position = members.iter().position(|m| m.path == parent).unwrap();
            assert!(position < i, "{parent} must precede {}", entry.path);
        }
    }
}

// ---------------------------------------------------------------------------
// Header fields
// ---------------------------------------------------------------------------

#[test]
fn ownership_and_permission_sets_are_folded_into_one_entry() {
    let mut m = Manifest::new("m");
    m.push(
        "/etc/shadow",
        EntrySpec::file("root:*:19000::::::\n").with_mode(0o644),
    )
    .unwrap();
    m.push(
        "/etc/shadow",
        Permissions::new()
            .with_mode(0o640)
            .with_owner(Principal::named("root", 0))
            .with_group(Principal::named("shadow", 42)),
    )
    .unwrap();
    let members = read_archive(&archive(vec![m]));
    let shadows: Vec<_> = members
        .iter()
        .filter(|m| m.path == "etc/shadow")
        .collect();
    assert_eq!(shadows.len(), 1);
    let shadow = shadows[0];
    assert_eq!(shadow.mode, 0o640);
    assert_eq!((shadow.uid, shadow.uname.as_str()), (0, "root"));
    assert_eq!((shadow.gid, shadow.gname.as_str()), (42, "shadow"));
}

#[test]
fn unset_owner_is_uid_zero_without_name() {
    let mut m = Manifest::new("m");
    m.push("/motd", EntrySpec::file("hi")).unwrap();
    let motd = member(&read_archive(&archive(vec![m])), "motd").clone();
    assert_eq!((motd.uid, motd.gid), (0, 0));
    assert!(motd.uname.is_empty());
    assert!(motd.gname.is_empty());
}

#[test]
fn mtime_defaults_to_backend_option() {
    let mut m = Manifest::new("m");
    m.push("/a", EntrySpec::file("a")).unwrap();
    m.push("/b", EntrySpec::file("b").with_mtime(1_600_000_000))
        .unwrap();
    let bytes = compile_to_vec(
        m.into_declarations(),
        CompileOptions::default(),
        &ArchiveBackend::new(ArchiveOptions {
            mtime: 1_700_000_000,
        }),
    )
    .unwrap()
    .bytes;
    let members = read_archive(&bytes);
    assert_eq!(member(&members, "a").mtime, 1_700_000_000);
    assert_eq!(member(&members, "b").mtime, 1_600_000_000);
}

#[test]
fn symlinks_and_special_files() {
    let mut m = Manifest::new("m");
    m.push("/usr/bin/vi", EntrySpec::symlink("vim")).unwrap();
    m.push("/dev/null", EntrySpec::device(DeviceClass::Char, 1, 3))
        .unwrap();
    m.push("/dev/sda", EntrySpec::device(DeviceClass::Block, 8, 0))
        .unwrap();
    m.push("/run/initctl", EntrySpec::fifo()).unwrap();
    let members = read_archive(&archive(vec![m]));

    let vi = member(&members, "usr/bin/vi");
    assert_eq!(vi.kind, EntryType::Symlink);
    assert_eq!(vi.link.as_deref(), Some("vim"));
    assert!(vi.content.is_empty());
    assert_eq!(member(&members, "dev/null").kind, EntryType::Char);
    assert_eq!(member(&members, "dev/sda").kind, EntryType::Block);
    assert_eq!(member(&members, "run/initctl").kind, EntryType::Fifo);
}

#[test]
fn long_paths_and_names_use_pax_records() {
    let deep = format!("/opt/{}/{}", "d".repeat(120), "f".repeat(120));
    let long_user = "u".repeat(40);
    let mut m = Manifest::new("m");
    m.push(
        &deep,
        EntrySpec::file("x").with_owner(Principal::named(long_user.as_str(), 3_000_000)),
    )
    .unwrap();
    let members = read_archive(&archive(vec![m]));

    let file = member(&members, deep.trim_start_matches('/'));
    assert_eq!(file.content, b"x");
    assert_eq!(
        file.pax.get("uname").map(Vec::as_slice),
        Some(long_user.as_bytes())
    );
    assert_eq!(
        file.pax.get("uid").map(Vec::as_slice),
        Some(b"3000000".as_slice())
    );
}

#[test]
fn end_of_archive_is_two_zero_blocks() {
    let bytes = archive(vec![ssh_manifest()]);
    assert_eq!(bytes.len() % 512, 0);
    assert!(bytes[bytes.len() - 1024..].iter().all(|&b| b == 0));
}

// ---------------------------------------------------------------------------
// Backend refusals
// ---------------------------------------------------------------------------

#[test]
fn removal_alone_is_unsupported_by_the_archive() {
    let mut m = Manifest::new("m");
    m.push("/etc/old.conf", Resource::Absent).unwrap();
    let err = compile_to_vec(
        m.into_declarations(),
        CompileOptions::default(),
        &ArchiveBackend::default(),
    )
    .unwrap_err();
    assert!(
        err.to_string().contains("not supported by the archive backend"),
        "{err}"
    );
}

#[test]
fn oversized_xattr_is_a_render_error() {
    let mut m = Manifest::new("m");
    m.push("/blob", EntrySpec::file("")).unwrap();
    m.push("/blob", Xattr::new("user.big", vec![0u8; 65_537]))
        .unwrap();
    let err = compile_to_vec(
        m.into_declarations(),
        CompileOptions::default(),
        &ArchiveBackend::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("/blob"), "{err}");
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn stock_extraction_reproduces_tree() {
    use std::os::unix::fs::PermissionsExt as _;

    let bytes = archive(vec![ssh_manifest()]);
    let dest = tempfile::tempdir().unwrap();
    let mut archive = tar::Archive::new(bytes.as_slice());
    archive.set_preserve_permissions(true);
    archive.unpack(dest.path()).unwrap();

    let config = dest.path().join("etc/ssh/sshd_config");
    assert_eq!(std::fs::read(&config).unwrap(), b"B");
    let mode = std::fs::metadata(&config).unwrap().permissions().mode();
    assert_eq!(mode & 0o7777, 0o600);
    assert!(dest.path().join("etc/ssh").is_dir());
}

/// Whether GNU tar and the attr tools are installed and `dir` accepts
/// `user.*` attributes.
#[cfg(target_os = "linux")]
fn gnu_tar_with_user_xattrs(dir: &std::path::Path) -> bool {
    use std::process::Command;

    let gnu_tar = Command::new("tar")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).contains("GNU tar"));
    if !gnu_tar {
        return false;
    }
    let scratch = dir.join("xattr-check");
    std::fs::write(&scratch, b"").unwrap();
    let set = Command::new("setfattr")
        .args(["-n", "user.check", "-v", "1"])
        .arg(&scratch)
        .status()
        .is_ok_and(|s| s.success());
    let get = set
        && Command::new("getfattr")
            .args(["--only-values", "-n", "user.check"])
            .arg(&scratch)
            .output()
            .is_ok_and(|o| o.status.success() && o.stdout == b"1");
    std::fs::remove_file(&scratch).unwrap();
    get
}

#[cfg(target_os = "linux")]
#[test]
fn gnu_tar_restores_extended_attributes() {
    use std::process::Command;

    let work = tempfile::tempdir().unwrap();
    if !gnu_tar_with_user_xattrs(work.path()) {
        return;
    }
    let bundle = work.path().join("bundle.tar");
    std::fs::write(&bundle, archive(vec![ssh_manifest()])).unwrap();
    let root = work.path().join("root");
    std::fs::create_dir(&root).unwrap();

    let status = Command::new("tar")
        .args(["--xattrs", "--xattrs-include=*", "-xf"])
        .arg(&bundle)
        .arg("-C")
        .arg(&root)
        .status()
        .unwrap();
    assert!(status.success());

    let config = root.join("etc/ssh/sshd_config");
    assert_eq!(std::fs::read(&config).unwrap(), b"B");
    let value = Command::new("getfattr")
        .args(["--only-values", "-n", "user.managed"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(
        value.status.success(),
        "{}",
        String::from_utf8_lossy(&value.stderr)
    );
    assert_eq!(value.stdout, b"true");
}

#[test]
fn root_can_only_be_a_directory() {
    let mut m = Manifest::new("m");
    let err = m.push("/", EntrySpec::file("x")).unwrap_err();
    assert_eq!(err.field, "kind");
    assert!(m.is_empty());

    m.push("/", EntrySpec::directory().with_mode(0o700)).unwrap();
    m.push("/motd", EntrySpec::file("hi")).unwrap();
    let members = read_archive(&archive(vec![m]));
    assert_eq!(members[0].kind, EntryType::Directory);
    assert_eq!(members[0].mode, 0o700);
    assert_eq!(members[1].path, "motd");
}

#[test]
fn atime_travels_as_a_pax_record() {
    let mut m = Manifest::new("m");
    m.push("/motd", EntrySpec::file("hi").with_atime(1_650_000_000))
        .unwrap();
    let members = read_archive(&archive(vec![m]));
    assert_eq!(
        member(&members, "motd").pax.get("atime").map(Vec::as_slice),
        Some(b"1650000000".as_slice())
    );
}
