//! Error types for archive compilation and inspection.
//!
//! Every error maps to a stable [`ErrorKind`] so callers can report the
//! failure class in machine-readable output independently of the message.

use serde::Serialize;
use thiserror::Error;

/// Stable failure codes shared by build, diff and verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    SourceUnavailable,
    DuplicateMember,
    UnsupportedOption,
    UnsatisfiableRequirement,
    SignatureMismatch,
    MalformedArchive,
    InvalidMemberPath,
    Config,
    Io,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceUnavailable => "SourceUnavailable",
            Self::DuplicateMember => "DuplicateMember",
            Self::UnsupportedOption => "UnsupportedOption",
            Self::UnsatisfiableRequirement => "UnsatisfiableRequirement",
            Self::SignatureMismatch => "SignatureMismatch",
            Self::MalformedArchive => "MalformedArchive",
            Self::InvalidMemberPath => "InvalidMemberPath",
            Self::Config => "Config",
            Self::Io => "Io",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that abort an archive build.
///
/// A build that fails with any of these leaves no output file behind.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A source file could not be read.
    #[error("source unavailable: {path} ({origin}): {source}")]
    SourceUnavailable {
        path: String,
        origin: String,
        #[source]
        source: std::io::Error,
    },

    /// Two entries share one logical path.
    #[error("duplicate member: {path}")]
    DuplicateMember { path: String },

    /// An option value is not supported by this build.
    #[error("unsupported {option}: '{value}'")]
    UnsupportedOption { option: String, value: String },

    /// A logical path is empty, absolute or escapes the archive root.
    #[error("invalid member path: '{path}'")]
    InvalidMemberPath { path: String },

    /// The build was cancelled between compaction steps.
    #[error("build cancelled")]
    Cancelled,

    /// Writing the archive failed.
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            Self::DuplicateMember { .. } => ErrorKind::DuplicateMember,
            Self::UnsupportedOption { .. } => ErrorKind::UnsupportedOption,
            Self::InvalidMemberPath { .. } => ErrorKind::InvalidMemberPath,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
            Self::Config(err) => err.kind(),
        }
    }

    pub fn unsupported(option: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnsupportedOption {
            option: option.into(),
            value: value.into(),
        }
    }

    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while reading a finished archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The container does not follow the region layout.
    #[error("malformed archive: {reason}")]
    Malformed { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed { .. } => ErrorKind::MalformedArchive,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Errors raised while loading or validating `kiln.json`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid dependency manifest {path}: {message}")]
    Dependencies { path: String, message: String },

    #[error("invalid exclude pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("invalid signing key {path}: {message}")]
    Key { path: String, message: String },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}
