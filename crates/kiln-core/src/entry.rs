//! Source entries: the files that become archive members.

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// File kind tag used to select compactors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    /// Application source code.
    StructuredSource,
    /// Manifest / data files (JSON).
    ManifestData,
    /// Anything else; always stored verbatim.
    Other,
}

impl FileKind {
    /// Classify a path by extension (case-insensitive).
    pub fn detect(path: &str, source_extensions: &[String], manifest_extensions: &[String]) -> Self {
        let ext = match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return Self::Other,
        };
        if source_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            Self::StructuredSource
        } else if manifest_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            Self::ManifestData
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone)]
enum Content {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Single file to add to an archive.
///
/// Content is either held in memory or read from `origin` when the builder
/// reaches the entry, so an unreadable file fails the build with
/// [`BuildError::SourceUnavailable`] naming its logical path.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    logical_path: String,
    origin: PathBuf,
    kind: FileKind,
    content: Content,
}

impl SourceEntry {
    /// Entry backed by a file on disk.
    pub fn from_file(
        logical_path: impl Into<String>,
        origin: impl Into<PathBuf>,
        kind: FileKind,
    ) -> Self {
        let origin = origin.into();
        Self {
            logical_path: logical_path.into(),
            content: Content::File(origin.clone()),
            origin,
            kind,
        }
    }

    /// Entry with in-memory content.
    pub fn from_bytes(logical_path: impl Into<String>, content: impl Into<Vec<u8>>, kind: FileKind) -> Self {
        let logical_path = logical_path.into();
        Self {
            origin: PathBuf::from(&logical_path),
            logical_path,
            kind,
            content: Content::Bytes(content.into()),
        }
    }

    pub fn logical_path(&self) -> &str {
        &self.logical_path
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Read the entry content.
    pub fn read(&self) -> BuildResult<Cow<'_, [u8]>> {
        match &self.content {
            Content::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            Content::File(path) => std::fs::read(path).map(Cow::Owned).map_err(|source| {
                BuildError::SourceUnavailable {
                    path: self.logical_path.clone(),
                    origin: path.display().to_string(),
                    source,
                }
            }),
        }
    }
}

/// Normalize a logical path to POSIX relative form.
///
/// Backslashes become `/`, leading `./` and `/` are stripped, empty segments
/// collapse. Paths that are empty or contain `..` segments are rejected.
pub fn normalize_logical_path(path: &str) -> BuildResult<String> {
    let replaced = path.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in replaced.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(BuildError::InvalidMemberPath {
                    path: path.to_string(),
                })
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() || path.contains('\n') || path.contains('\0') {
        return Err(BuildError::InvalidMemberPath {
            path: path.to_string(),
        });
    }
    Ok(segments.join("/"))
}

/// Logical paths shipped in one build, as seen by requirement analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInventory {
    paths: BTreeSet<String>,
}

impl SourceInventory {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_entries(entries: &[SourceEntry]) -> Self {
        Self::new(entries.iter().map(|e| e.logical_path().to_string()))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// True when any shipped path lies below `dir` (or equals it).
    pub fn has_path_under(&self, dir: &str) -> bool {
        let dir = dir.trim_matches('/');
        if dir.is_empty() {
            return !self.paths.is_empty();
        }
        let prefix = format!("{dir}/");
        self.paths
            .range(dir.to_string()..)
            .take_while(|p| p.starts_with(dir))
            .any(|p| p == dir || p.starts_with(&prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}
