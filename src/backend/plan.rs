//! Plan backend: a human- or machine-readable listing of the resolved
//! sequence.
//!
//! Unlike the archive backend it represents every node, removal markers
//! included, so it can show exactly what a compilation would do.  Entries
//! without a declared mode show the mode the archive falls back to, marked
//! with `*` in text and `mode_default` in JSON.
use std::io::Write;

use serde::Serialize;

use super::archive::default_mode;
use super::error::{BackendError, RenderError};
use super::{Backend, sha256_hex};
use crate::graph::{NodeState, ResolvedSequence, ResourceNode};
use crate::resources::{DeviceClass, Entry, EntrySpec, Principal, ResourceKind, TargetPath};

/// Output flavour of [`PlanBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlanFormat {
    /// One line per node, attributes indented below.
    #[default]
    Text,
    /// Pretty-printed JSON array.
    Json,
}

/// Renders the resolved sequence as a plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBackend {
    format: PlanFormat,
}

impl PlanBackend {
    /// Create a plan backend.
    #[must_use]
    pub const fn new(format: PlanFormat) -> Self {
        Self { format }
    }

    fn render_text(sequence: &ResolvedSequence, sink: &mut dyn Write) -> Result<(), RenderError> {
        for node in sequence {
            writeln!(sink, "{}", text_line(node)).map_err(|e| RenderError::io(&node.path, e))?;
            for (name, value) in &node.xattrs {
                writeln!(sink, "    xattr {name} ({} bytes)", value.len())
                    .map_err(|e| RenderError::io(&node.path, e))?;
            }
        }
        Ok(())
    }

    fn render_json(sequence: &ResolvedSequence, sink: &mut dyn Write) -> Result<(), RenderError> {
        let entries: Vec<PlanEntry<'_>> = sequence.iter().map(PlanEntry::from_node).collect();
        serde_json::to_writer_pretty(&mut *sink, &entries)?;
        writeln!(sink).map_err(RenderError::Finish)
    }
}

impl Backend for PlanBackend {
    fn name(&self) -> &'static str {
        "plan"
    }

    fn validate(&self, _sequence: &ResolvedSequence) -> Result<(), BackendError> {
        Ok(())
    }

    fn render(
        &self,
        sequence: &ResolvedSequence,
        sink: &mut dyn Write,
    ) -> Result<(), BackendError> {
        self.validate(sequence)?;
        match self.format {
            PlanFormat::Text => Self::render_text(sequence, sink)?,
            PlanFormat::Json => Self::render_json(sequence, sink)?,
        }
        Ok(())
    }
}

fn text_line(node: &ResourceNode) -> String {
    let spec = match &node.state {
        NodeState::Declared(spec) | NodeState::Implicit(spec) => spec,
        NodeState::Absent => return format!("remove {}", node.path),
    };
    let mode = if spec.permissions.mode.is_some() {
        resolved_mode(spec)
    } else {
        format!("{}*", resolved_mode(spec))
    };
    let owner = display_principal(spec.permissions.owner.as_ref());
    let group = display_principal(spec.permissions.group.as_ref());

    let suffix = match &spec.entry {
        Entry::Directory if node.is_implicit() => " (implicit)".to_string(),
        Entry::Directory | Entry::Fifo => String::new(),
        Entry::File { content } => format!(" ({} bytes)", content.len()),
        Entry::Symlink { target } => format!(" -> {target}"),
        Entry::Device {
            class,
            major,
            minor,
        } => format!(" ({} {major}:{minor})", device_class(*class)),
    };
    format!(
        "{:<12} {mode:<5} {owner}:{group} {}{suffix}",
        spec.kind(),
        node.path
    )
}

/// Declared mode, or the one the archive would write.
fn resolved_mode(spec: &EntrySpec) -> String {
    spec.permissions
        .mode
        .map_or_else(|| format!("{:04o}", default_mode(&spec.entry)), |m| m.to_string())
}

fn display_principal(principal: Option<&Principal>) -> String {
    principal.map_or_else(|| "-".to_string(), ToString::to_string)
}

const fn device_class(class: DeviceClass) -> &'static str {
    match class {
        DeviceClass::Char => "char",
        DeviceClass::Block => "block",
    }
}

#[derive(Debug, Serialize)]
struct DeviceInfo {
    class: DeviceClass,
    major: u32,
    minor: u32,
}

#[derive(Debug, Serialize)]
struct XattrInfo<'a> {
    name: &'a str,
    size: usize,
}

#[derive(Debug, Serialize)]
struct PlanEntry<'a> {
    path: &'a TargetPath,
    kind: ResourceKind,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    implicit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    mode_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<&'a Principal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a Principal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    atime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<DeviceInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    xattrs: Vec<XattrInfo<'a>>,
    declared_by: Vec<String>,
}

impl<'a> PlanEntry<'a> {
    fn from_node(node: &'a ResourceNode) -> Self {
        let mut entry = Self {
            path: &node.path,
            kind: node.kind(),
            implicit: node.is_implicit(),
            mode: None,
            mode_default: false,
            owner: None,
            group: None,
            mtime: None,
            atime: None,
            target: None,
            size: None,
            sha256: None,
            device: None,
            xattrs: node
                .xattrs
                .iter()
                .map(|(name, value)| XattrInfo {
                    name,
                    size: value.len(),
                })
                .collect(),
            declared_by: node.provenance.iter().map(ToString::to_string).collect(),
        };

        if let Some(spec) = node.state.entry() {
            entry.mode = Some(resolved_mode(spec));
            entry.mode_default = spec.permissions.mode.is_none();
            entry.owner = spec.permissions.owner.as_ref();
            entry.group = spec.permissions.group.as_ref();
            entry.mtime = spec.mtime;
            entry.atime = spec.atime;
            match &spec.entry {
                Entry::File { content } => {
                    entry.size = Some(content.len());
                    entry.sha256 = Some(sha256_hex(content));
                }
                Entry::Symlink { target } => entry.target = Some(target.as_str()),
                Entry::Device {
                    class,
                    major,
                    minor,
                } => {
                    entry.device = Some(DeviceInfo {
                        class: *class,
                        major: *major,
                        minor: *minor,
                    });
                }
                Entry::Directory | Entry::Fifo => {}
            }
        }
        entry
    }
}
