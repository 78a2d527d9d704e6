//! Content compaction applied to archive members.
//!
//! A [`Compactor`] is a pure, best-effort transformation for one file kind.
//! Compactors never fail: malformed input comes back unchanged. A
//! [`CompactorChain`] applies its compactors in caller-specified order; each
//! one only touches entries of the kind it declares.

pub mod json;
pub mod source;

use crate::entry::FileKind;
use crate::error::{BuildError, BuildResult};

pub use json::ManifestDataMinifier;
pub use source::StructuredSourceMinifier;

/// Tagged compactor variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compactor {
    StructuredSource(StructuredSourceMinifier),
    ManifestData(ManifestDataMinifier),
    PassThrough,
}

impl Compactor {
    /// Parse a configuration name (`source`, `json`, `none`).
    pub fn from_name(name: &str) -> BuildResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(Self::StructuredSource(StructuredSourceMinifier)),
            "json" => Ok(Self::ManifestData(ManifestDataMinifier)),
            "none" | "pass-through" => Ok(Self::PassThrough),
            _ => Err(BuildError::unsupported("compactor", name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StructuredSource(_) => "source",
            Self::ManifestData(_) => "json",
            Self::PassThrough => "none",
        }
    }

    /// File kind this compactor transforms, `None` for pass-through.
    pub fn kind(&self) -> Option<FileKind> {
        match self {
            Self::StructuredSource(_) => Some(FileKind::StructuredSource),
            Self::ManifestData(_) => Some(FileKind::ManifestData),
            Self::PassThrough => None,
        }
    }

    pub fn compact(&self, content: &[u8], logical_path: &str) -> Vec<u8> {
        match self {
            Self::StructuredSource(m) => m.compact(content, logical_path),
            Self::ManifestData(m) => m.compact(content, logical_path),
            Self::PassThrough => content.to_vec(),
        }
    }
}

/// Ordered compactors; part of the build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactorChain {
    compactors: Vec<Compactor>,
}

impl CompactorChain {
    pub fn new(compactors: Vec<Compactor>) -> Self {
        Self { compactors }
    }

    /// Chain that stores every member verbatim.
    pub fn pass_through() -> Self {
        Self::default()
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> BuildResult<Self> {
        let compactors = names
            .iter()
            .map(|n| Compactor::from_name(n.as_ref()))
            .collect::<BuildResult<Vec<_>>>()?;
        Ok(Self { compactors })
    }

    pub fn compactors(&self) -> &[Compactor] {
        &self.compactors
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.compactors.iter().map(Compactor::name).collect()
    }

    /// Feed `content` through every compactor that handles `kind`.
    pub fn apply(&self, kind: FileKind, content: &[u8], logical_path: &str) -> Vec<u8> {
        let mut current = content.to_vec();
        for compactor in &self.compactors {
            if compactor.kind() == Some(kind) {
                current = compactor.compact(&current, logical_path);
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_from_names() {
        let chain = CompactorChain::from_names(&["source", "json", "none"]).unwrap();
        assert_eq!(chain.names(), vec!["source", "json", "none"]);

        let err = CompactorChain::from_names(&["yaml"]).unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedOption { .. }));
    }

    #[test]
    fn chain_only_touches_matching_kind() {
        let chain = CompactorChain::from_names(&["json"]).unwrap();
        let json = br#"{ "a" : 1 }"#;
        assert_eq!(chain.apply(FileKind::ManifestData, json, "a.json"), br#"{"a":1}"#);
        assert_eq!(chain.apply(FileKind::Other, json, "a.txt"), json.to_vec());
        assert_eq!(chain.apply(FileKind::StructuredSource, json, "a.php"), json.to_vec());
    }

    #[test]
    fn empty_chain_is_identity() {
        let chain = CompactorChain::pass_through();
        let data = b"  keep   me  ";
        assert_eq!(chain.apply(FileKind::StructuredSource, data, "x.php"), data.to_vec());
    }
}
