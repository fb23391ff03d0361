// Shared helpers for integration tests.
//
// Provides a temporary directory for manifest files and a decoder that reads
// compiled archives back through the `tar` crate, so each integration test
// can check what a stock extractor would see.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use tar::EntryType;

/// One archive member as an extractor sees it, PAX records applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub path: String,
    pub kind: EntryType,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub uname: String,
    pub gname: String,
    pub mtime: u64,
    pub link: Option<String>,
    pub content: Vec<u8>,
    /// Every PAX record attached to the member.
    pub pax: BTreeMap<String, Vec<u8>>,
}

impl Member {
    /// Extended attributes, keyed by attribute name.
    pub fn xattrs(&self) -> BTreeMap<String, Vec<u8>> {
        self.pax
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix("SCHILY.xattr.")
                    .map(|name| (name.to_string(), v.clone()))
            })
            .collect()
    }
}

/// Decode every member of `bytes`.
pub fn read_archive(bytes: &[u8]) -> Vec<Member> {
    let mut archive = tar::Archive::new(bytes);
    archive
        .entries()
        .expect("read archive")
        .map(|entry| {
            let mut entry = entry.expect("read entry");
            let pax: BTreeMap<String, Vec<u8>> = entry
                .pax_extensions()
                .expect("read pax extensions")
                .map(|exts| {
                    exts.map(|ext| {
                        let ext = ext.expect("pax record");
                        (
                            ext.key().expect("utf-8 key").to_string(),
                            ext.value_bytes().to_vec(),
                        )
                    })
                    .collect()
                })
                .unwrap_or_default();
            let header = entry.header().clone();
            let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let link = entry
                .link_name_bytes()
                .map(|l| String::from_utf8_lossy(&l).into_owned());
            let mut content = Vec::new();
            entry.read_to_end(&mut content).expect("read content");
            Member {
                path,
                kind: header.entry_type(),
                mode: header.mode().expect("mode"),
                uid: header.uid().expect("uid"),
                gid: header.gid().expect("gid"),
                uname: header
                    .username()
                    .expect("utf-8 uname")
                    .unwrap_or_default()
                    .to_string(),
                gname: header
                    .groupname()
                    .expect("utf-8 gname")
                    .unwrap_or_default()
                    .to_string(),
                mtime: header.mtime().expect("mtime"),
                link,
                content,
                pax,
            }
        })
        .collect()
}

/// Find the member named `path`, panicking with the member list otherwise.
pub fn member<'a>(members: &'a [Member], path: &str) -> &'a Member {
    members
        .iter()
        .find(|m| m.path == path)
        .unwrap_or_else(|| {
            let names: Vec<&str> = members.iter().map(|m| m.path.as_str()).collect();
            panic!("no member '{path}' in {names:?}")
        })
}

/// A temporary directory holding manifest files.
pub struct ManifestDir {
    pub dir: tempfile::TempDir,
}

impl ManifestDir {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a manifest file and return its path.
    pub fn manifest(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write manifest");
        path
    }

    /// Write a payload file (for `source = ...`) relative to the directory.
    pub fn file(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, content).expect("write file");
        path
    }
}
