//! Compile an application tree into a single self-executing archive.
//!
//! An archive is a shell bootstrap stub followed by a compressed member
//! table and an optional signature region. Builds are byte-for-byte
//! reproducible for identical inputs.

pub mod archive;
pub mod compactor;
pub mod compile;
pub mod config;
pub mod discovery;
pub mod entry;
pub mod error;
pub mod requirements;
pub mod stub;

// Convenience re-exports
pub use archive::{
    diff, verify, verify_with_key, Archive, ArchiveBuilder, BuildOptions, BuildSummary,
    Compression, DiffReport, VerificationResult,
};
pub use compactor::{Compactor, CompactorChain};
pub use compile::{compile, CompileOverrides, CompileReport, Diagnostic};
pub use config::{BuildConfig, DEFAULT_CONFIG_FILE};
pub use discovery::{discover, Discovered};
pub use entry::{FileKind, SourceEntry, SourceInventory};
pub use error::{ArchiveError, BuildError, BuildResult, ConfigError, ErrorKind};
pub use requirements::{analyze, DependencyEntry, RequirementManifest};
pub use stub::{BootstrapStub, IoContext, IoMode, StubOptions, StubSynthesizer, Verbosity};
