//! Requirement evaluation against a runtime.
//!
//! [`RequirementChecker`] applies a [`RequirementManifest`] to a
//! [`RuntimeProfile`] with the same rules, order and output format as the
//! check routine embedded in generated stubs.

use crate::requirements::{RequirementKind, RequirementManifest};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::process::Command;

/// Prefix of every machine-readable failure line.
pub const FAILURE_PREFIX: &str = "kiln-requirement-failure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Unsatisfiable,
    Runtime,
    RuntimeVersion,
    Extension,
    ConflictingExtension,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsatisfiable => "unsatisfiable",
            Self::Runtime => "runtime",
            Self::RuntimeVersion => "runtime-version",
            Self::Extension => "extension",
            Self::ConflictingExtension => "conflicting-extension",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementFailure {
    pub kind: FailureKind,
    pub identifier: String,
    pub detail: String,
}

impl RequirementFailure {
    /// `kiln-requirement-failure<TAB>kind<TAB>identifier<TAB>detail`
    pub fn to_line(&self) -> String {
        format!(
            "{FAILURE_PREFIX}\t{}\t{}\t{}",
            self.kind.as_str(),
            self.identifier,
            self.detail
        )
    }

    /// Parse one line produced by [`Self::to_line`] or by a stub.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.trim_end_matches(['\r', '\n']).splitn(4, '\t');
        if parts.next()? != FAILURE_PREFIX {
            return None;
        }
        let kind = match parts.next()? {
            "unsatisfiable" => FailureKind::Unsatisfiable,
            "runtime" => FailureKind::Runtime,
            "runtime-version" => FailureKind::RuntimeVersion,
            "extension" => FailureKind::Extension,
            "conflicting-extension" => FailureKind::ConflictingExtension,
            _ => return None,
        };
        Some(Self {
            kind,
            identifier: parts.next()?.to_string(),
            detail: parts.next().unwrap_or_default().to_string(),
        })
    }
}

/// What is known about the runtime an archive would run on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeProfile {
    pub command: String,
    pub available: bool,
    /// Version text as extracted from the version probe (`8.2.7`, `8.3`).
    pub version: Option<String>,
    /// Loaded extensions, lowercase.
    pub extensions: BTreeSet<String>,
}

impl RuntimeProfile {
    pub fn new<I, S>(command: impl Into<String>, version: Option<&str>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            command: command.into(),
            available: true,
            version: version.map(str::to_string),
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Profile of a runtime command that cannot be found.
    pub fn missing(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Run the probes against `command` on this machine.
    pub fn probe(command: &str, version_probe: &[String], extensions_probe: &[String]) -> Self {
        let version_output = match Command::new(command).args(version_probe).output() {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!(runtime = command, error = %e, "runtime probe failed");
                return Self::missing(command);
            }
        };
        let version = parse_version_output(&String::from_utf8_lossy(&version_output.stdout));
        let extensions = Command::new(command)
            .args(extensions_probe)
            .output()
            .map(|out| parse_extensions_output(&String::from_utf8_lossy(&out.stdout)))
            .unwrap_or_default();
        Self {
            command: command.to_string(),
            available: true,
            version,
            extensions,
        }
    }
}

/// First `x.y[.z]` found at the first digit of a line.
///
/// A line whose first digit run is not followed by `.digits` is skipped.
pub fn parse_version_output(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find(|c: char| c.is_ascii_digit())?;
        let rest = &line[start..];
        let major = digit_run(rest);
        let after_major = &rest[major..];
        let minor = after_major.strip_prefix('.').map(digit_run).filter(|n| *n > 0)?;
        let mut end = major + 1 + minor;
        if let Some(patch) = rest[end..].strip_prefix('.').map(digit_run).filter(|n| *n > 0) {
            end += 1 + patch;
        }
        Some(rest[..end].to_string())
    })
}

fn digit_run(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

/// One extension per line; headers such as `[PHP Modules]` are harmless.
pub fn parse_extensions_output(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Compare dotted versions numerically on three components.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> [u64; 3] {
        let mut out = [0; 3];
        for (slot, part) in out.iter_mut().zip(v.split('.')) {
            *slot = part.parse().unwrap_or(0);
        }
        out
    };
    parts(a).cmp(&parts(b))
}

/// Outcome of one check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub failures: Vec<RequirementFailure>,
}

impl CheckReport {
    pub fn is_satisfied(&self) -> bool {
        self.failures.is_empty()
    }

    /// Machine-readable listing, one failure per line.
    pub fn to_lines(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}\n", f.to_line()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementChecker;

impl RequirementChecker {
    /// Evaluate `manifest` against `runtime`.
    ///
    /// Order: conflicts, runtime presence, then requirements in manifest
    /// order. Nothing beyond conflicts is checked when the runtime is missing.
    pub fn check(&self, manifest: &RequirementManifest, runtime: &RuntimeProfile) -> CheckReport {
        let mut failures = Vec::new();
        if manifest.is_empty() {
            return CheckReport { failures };
        }

        for conflict in manifest.conflicts() {
            failures.push(RequirementFailure {
                kind: FailureKind::Unsatisfiable,
                identifier: conflict.extension.clone(),
                detail: conflict.describe(),
            });
        }

        if !runtime.available {
            failures.push(RequirementFailure {
                kind: FailureKind::Runtime,
                identifier: runtime.command.clone(),
                detail: "not found".to_string(),
            });
            return CheckReport { failures };
        }

        for req in manifest.requirements() {
            let declared = req.declared_by.join(", ");
            let failure = match req.kind {
                RequirementKind::RuntimeVersionMin => {
                    let ok = runtime
                        .version
                        .as_deref()
                        .is_some_and(|v| compare_versions(v, &req.identifier) != Ordering::Less);
                    (!ok).then(|| {
                        let found = runtime.version.as_deref().unwrap_or("unknown");
                        (FailureKind::RuntimeVersion, format!("found {found} (required by {declared})"))
                    })
                }
                RequirementKind::ExtensionPresent => (!runtime.extensions.contains(&req.identifier))
                    .then(|| (FailureKind::Extension, format!("missing (required by {declared})"))),
                RequirementKind::ConflictingExtension => runtime
                    .extensions
                    .contains(&req.identifier)
                    .then(|| {
                        (
                            FailureKind::ConflictingExtension,
                            format!("loaded (excluded by {declared})"),
                        )
                    }),
            };
            if let Some((kind, detail)) = failure {
                failures.push(RequirementFailure {
                    kind,
                    identifier: req.identifier.clone(),
                    detail,
                });
            }
        }

        CheckReport { failures }
    }
}
