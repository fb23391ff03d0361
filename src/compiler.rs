//! Compilation pipeline: builder, resolver and backend in sequence.
//!
//! Each call constructs and discards its own graph, so independent
//! compilations in one process never share state.
use std::io::Write;

use crate::backend::{Backend, sha256_hex};
use crate::error::Result;
use crate::graph::{self, BuildOptions, BuildWarning, ResolvedSequence};
use crate::resources::{Manifest, ResourceDeclaration, manifest};

/// Options for one compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Graph builder options.
    pub build: BuildOptions,
}

impl CompileOptions {
    /// Options with strict override checking.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            build: BuildOptions::strict(),
        }
    }
}

/// Outcome of a successful [`compile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Number of resolved nodes handed to the backend.
    pub entries: usize,
    /// Non-fatal findings from the graph builder.
    pub warnings: Vec<BuildWarning>,
}

/// A fully rendered output held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Backend output.
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`.
    pub fingerprint: String,
    /// Non-fatal findings from the graph builder.
    pub warnings: Vec<BuildWarning>,
}

/// Build and order the graph without rendering it.
///
/// # Errors
///
/// Returns [`Error::Conflict`](crate::error::Error::Conflict),
/// [`Error::Graph`](crate::error::Error::Graph) or
/// [`Error::Cycle`](crate::error::Error::Cycle).
pub fn resolve<I>(declarations: I, options: CompileOptions) -> Result<ResolvedSequence>
where
    I: IntoIterator<Item = ResourceDeclaration>,
{
    let graph = graph::build(declarations, options.build)?;
    Ok(graph::resolve(graph)?)
}

/// Compile `declarations` with `backend`, streaming into `sink`.
///
/// Nothing is written unless the graph builds, resolves and passes backend
/// validation. A write failure part way through leaves `sink` incomplete;
/// use [`compile_to_vec`] when the output must be all-or-nothing.
///
/// # Errors
///
/// Returns the first error from the builder, the resolver or the backend.
pub fn compile<I>(
    declarations: I,
    options: CompileOptions,
    backend: &dyn Backend,
    sink: &mut dyn Write,
) -> Result<CompileReport>
where
    I: IntoIterator<Item = ResourceDeclaration>,
{
    let sequence = resolve(declarations, options)?;
    tracing::debug!(
        "rendering {} node(s) with the {} backend",
        sequence.len(),
        backend.name()
    );
    backend.render(&sequence, sink)?;
    Ok(CompileReport {
        entries: sequence.len(),
        warnings: sequence.warnings().to_vec(),
    })
}

/// Compile into memory and fingerprint the result.
///
/// # Errors
///
/// Same as [`compile`]. On error no bytes are returned.
pub fn compile_to_vec<I>(
    declarations: I,
    options: CompileOptions,
    backend: &dyn Backend,
) -> Result<Artifact>
where
    I: IntoIterator<Item = ResourceDeclaration>,
{
    let mut bytes = Vec::new();
    let report = compile(declarations, options, backend, &mut bytes)?;
    let fingerprint = sha256_hex(&bytes);
    Ok(Artifact {
        bytes,
        fingerprint,
        warnings: report.warnings,
    })
}

/// Collects manifests in order and compiles them together.
///
/// # Examples
///
/// ```
/// use confbundler::backend::ArchiveBackend;
/// use confbundler::compiler::Compiler;
/// use confbundler::resources::{EntrySpec, Manifest};
///
/// let mut motd = Manifest::new("motd");
/// motd.push("/etc/motd", EntrySpec::file("hello\n")).unwrap();
///
/// let artifact = Compiler::default()
///     .with_manifest(motd)
///     .compile_to_vec(&ArchiveBackend::default())
///     .unwrap();
/// assert_eq!(artifact.fingerprint.len(), 64);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
    manifests: Vec<Manifest>,
}

impl Compiler {
    /// Create a compiler with the given options.
    #[must_use]
    pub const fn new(options: CompileOptions) -> Self {
        Self {
            options,
            manifests: Vec::new(),
        }
    }

    /// Append a manifest; manifests are concatenated in the order added.
    pub fn add_manifest(&mut self, manifest: Manifest) {
        self.manifests.push(manifest);
    }

    /// Builder-style [`add_manifest`](Self::add_manifest).
    #[must_use]
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.add_manifest(manifest);
        self
    }

    /// Number of manifests added so far.
    #[must_use]
    pub fn manifest_count(&self) -> usize {
        self.manifests.len()
    }

    fn declarations(&self) -> Vec<ResourceDeclaration> {
        manifest::concat(self.manifests.iter().cloned())
    }

    /// Build and order the graph without rendering it.
    ///
    /// # Errors
    ///
    /// See [`resolve`].
    pub fn resolve(&self) -> Result<ResolvedSequence> {
        resolve(self.declarations(), self.options)
    }

    /// Compile every manifest into `sink`.
    ///
    /// # Errors
    ///
    /// See [`compile`].
    pub fn compile(&self, backend: &dyn Backend, sink: &mut dyn Write) -> Result<CompileReport> {
        compile(self.declarations(), self.options, backend, sink)
    }

    /// Compile every manifest into memory.
    ///
    /// # Errors
    ///
    /// See [`compile_to_vec`].
    pub fn compile_to_vec(&self, backend: &dyn Backend) -> Result<Artifact> {
        compile_to_vec(self.declarations(), self.options, backend)
    }
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
    use crate::backend::{ArchiveBackend, BackendError, PlanBackend};
    use crate::error::Error;
    use crate::graph::ConflictReason;
    use crate::resources::{EntrySpec, Provenance, Resource, TargetPath};

    fn motd(id: &str, content: &str) -> Manifest {
        let mut m = Manifest::new(id);
        m.push("/etc/motd", EntrySpec::file(content)).unwrap();
        m
    }

    // -----------------------------------------------------------------------
    // compile
    // -----------------------------------------------------------------------

    #[test]
    fn compile_reports_entries_and_warnings() {
        let decls = manifest::concat([motd("a", "A"), motd("b", "B")]);
        let mut out = Vec::new();
        let report = compile(
            decls,
            CompileOptions::default(),
            &ArchiveBackend::default(),
            &mut out,
        )
        .unwrap();
        // implicit root, /etc, /etc/motd
        assert_eq!(report.entries, 3);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].provenance,
            vec![Provenance::new("a", 0), Provenance::new("b", 0)]
        );
        assert!(!out.is_empty());
    }

    #[test]
    fn strict_options_turn_overrides_into_conflicts() {
        let decls = manifest::concat([motd("a", "A"), motd("b", "B")]);
        let err = compile_to_vec(decls, CompileOptions::strict(), &ArchiveBackend::default())
            .unwrap_err();
        let Error::Conflict(conflict) = err else {
            panic!("expected conflict, got {err:?}");
        };
        assert!(matches!(conflict.reason, ConflictReason::Override { .. }));
    }

    #[test]
    fn nothing_is_written_when_backend_rejects() {
        let mut m = Manifest::new("m");
        m.push("/etc/old.conf", Resource::Absent).unwrap();
        let mut out = Vec::new();
        let err = compile(
            m.into_declarations(),
            CompileOptions::default(),
            &ArchiveBackend::default(),
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Backend(BackendError::Unsupported(ref u)) if u.operation == "remove"
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn plan_backend_accepts_removals() {
        let mut m = Manifest::new("m");
        m.push("/etc/old.conf", Resource::Absent).unwrap();
        let artifact = compile_to_vec(
            m.into_declarations(),
            CompileOptions::default(),
            &PlanBackend::default(),
        )
        .unwrap();
        assert!(
            String::from_utf8(artifact.bytes)
                .unwrap()
                .contains("remove /etc/old.conf")
        );
    }

    // -----------------------------------------------------------------------
    // compile_to_vec
    // -----------------------------------------------------------------------

    #[test]
    fn fingerprint_is_sha256_of_bytes() {
        let artifact = compile_to_vec(
            motd("m", "hi").into_declarations(),
            CompileOptions::default(),
            &ArchiveBackend::default(),
        )
        .unwrap();
        assert_eq!(artifact.fingerprint, sha256_hex(&artifact.bytes));
        assert_eq!(artifact.bytes.len() % 512, 0);
    }

    #[test]
    fn repeated_compilation_is_byte_identical() {
        let first = Compiler::default()
            .with_manifest(motd("m", "hi"))
            .compile_to_vec(&ArchiveBackend::default())
            .unwrap();
        let second = Compiler::default()
            .with_manifest(motd("m", "hi"))
            .compile_to_vec(&ArchiveBackend::default())
            .unwrap();
        assert_eq!(first, second);
    }

    // -----------------------------------------------------------------------
    // Compiler
    // -----------------------------------------------------------------------

    #[test]
    fn compiler_concatenates_manifests_in_order() {
        let mut compiler = Compiler::new(CompileOptions::default());
        compiler.add_manifest(motd("a", "A"));
        compiler.add_manifest(motd("b", "B"));
        assert_eq!(compiler.manifest_count(), 2);

        let sequence = compiler.resolve().unwrap();
        let path = TargetPath::parse("/etc/motd").unwrap();
        let node = &sequence.nodes()[sequence.position(&path).unwrap()];
        assert_eq!(
            node.state.entry().map(|spec| spec.entry.clone()),
            Some(EntrySpec::file("B").entry)
        );
        assert_eq!(sequence.provenance(&path).len(), 2);
    }

    #[test]
    fn empty_compiler_renders_end_of_archive_only() {
        let artifact = Compiler::default()
            .compile_to_vec(&ArchiveBackend::default())
            .unwrap();
        assert_eq!(artifact.bytes, vec![0u8; 1024]);
    }
}
