//! Runtime requirement analysis.
//!
//! Consumes the resolved dependency manifest and derives the
//! [`RequirementManifest`] an archive enforces before running.

pub mod analyzer;
pub mod constraint;

pub use analyzer::analyze;
pub use constraint::{constraint_floor, ConstraintError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One resolved dependency, as supplied by the dependency resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DependencyEntry {
    pub name: String,
    /// Runtime version constraint, e.g. `^8.1 || ^8.2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    #[serde(default)]
    pub require_extensions: BTreeSet<String>,
    #[serde(default)]
    pub exclude_extensions: BTreeSet<String>,
    /// Directory (logical path) the dependency is installed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<String>,
}

impl DependencyEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn requires(mut self, extension: impl Into<String>) -> Self {
        self.require_extensions.insert(extension.into());
        self
    }

    pub fn excludes(mut self, extension: impl Into<String>) -> Self {
        self.exclude_extensions.insert(extension.into());
        self
    }

    pub fn installed_at(mut self, path: impl Into<String>) -> Self {
        self.install_path = Some(path.into());
        self
    }
}

/// Requirement classes, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementKind {
    /// Runtime version must be at least `identifier`.
    RuntimeVersionMin,
    /// Extension `identifier` must be loaded.
    ExtensionPresent,
    /// Extension `identifier` must not be loaded.
    ConflictingExtension,
}

impl RequirementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuntimeVersionMin => "runtime-version",
            Self::ExtensionPresent => "extension",
            Self::ConflictingExtension => "conflicting-extension",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Requirement {
    pub kind: RequirementKind,
    pub identifier: String,
    /// Dependencies that declared the requirement, sorted.
    pub declared_by: Vec<String>,
}

/// An extension that is both required and excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RequirementConflict {
    pub extension: String,
    pub required_by: Vec<String>,
    pub excluded_by: Vec<String>,
}

impl RequirementConflict {
    pub fn describe(&self) -> String {
        format!(
            "extension {} is required by {} and excluded by {}",
            self.extension,
            self.required_by.join(", "),
            self.excluded_by.join(", ")
        )
    }
}

/// Derived runtime requirements of one archive. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RequirementManifest {
    requirements: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conflicts: Vec<RequirementConflict>,
    /// Constraints that could not be interpreted. Not embedded in archives.
    #[serde(skip)]
    warnings: Vec<String>,
}

impl RequirementManifest {
    pub(crate) fn new(
        mut requirements: Vec<Requirement>,
        mut conflicts: Vec<RequirementConflict>,
        warnings: Vec<String>,
    ) -> Self {
        requirements.sort_by(|a, b| (a.kind, &a.identifier).cmp(&(b.kind, &b.identifier)));
        conflicts.sort_by(|a, b| a.extension.cmp(&b.extension));
        Self {
            requirements,
            conflicts,
            warnings,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn conflicts(&self) -> &[RequirementConflict] {
        &self.conflicts
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.conflicts.is_empty()
    }

    /// True when some requirement can never be met.
    pub fn is_unsatisfiable(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Minimum runtime version, if any dependency declared one.
    pub fn runtime_floor(&self) -> Option<&str> {
        self.requirements
            .iter()
            .find(|r| r.kind == RequirementKind::RuntimeVersionMin)
            .map(|r| r.identifier.as_str())
    }

    pub fn of_kind(&self, kind: RequirementKind) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter().filter(move |r| r.kind == kind)
    }

    /// Compact JSON form embedded in the bootstrap stub.
    pub fn to_json(&self) -> String {
        // Plain strings and vectors only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"requirements\":[]}"))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
