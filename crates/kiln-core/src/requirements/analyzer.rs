use super::constraint::constraint_floor;
use super::{DependencyEntry, Requirement, RequirementConflict, RequirementKind, RequirementManifest};
use crate::entry::SourceInventory;
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};

/// Derive the runtime requirements of an archive.
///
/// Version floors merge to the most restrictive (highest) one; extension
/// requirements and exclusions are unioned. An extension that is both
/// required and excluded is recorded as a conflict and the manifest reports
/// itself unsatisfiable. The result does not depend on entry order.
pub fn analyze(entries: &[DependencyEntry], inventory: &SourceInventory) -> RequirementManifest {
    let mut warnings = Vec::new();
    let mut floors: BTreeMap<Version, BTreeSet<String>> = BTreeMap::new();
    let mut required: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut excluded: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for entry in entries {
        if let Some(install_path) = entry.install_path.as_deref() {
            if !inventory.has_path_under(install_path) {
                tracing::debug!(
                    dependency = %entry.name,
                    install_path,
                    "dependency not shipped, ignoring its requirements"
                );
                continue;
            }
        }

        if let Some(constraint) = entry.constraint.as_deref() {
            match constraint_floor(constraint) {
                Ok(Some(floor)) => {
                    floors.entry(floor).or_default().insert(entry.name.clone());
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(dependency = %entry.name, error = %e, "skipping version constraint");
                    warnings.push(format!("{}: {}", entry.name, e));
                }
            }
        }

        for ext in &entry.require_extensions {
            required
                .entry(normalize_extension(ext))
                .or_default()
                .insert(entry.name.clone());
        }
        for ext in &entry.exclude_extensions {
            excluded
                .entry(normalize_extension(ext))
                .or_default()
                .insert(entry.name.clone());
        }
    }

    let mut requirements = Vec::new();
    if let Some((floor, declared_by)) = floors.into_iter().next_back() {
        requirements.push(Requirement {
            kind: RequirementKind::RuntimeVersionMin,
            identifier: floor.to_string(),
            declared_by: declared_by.into_iter().collect(),
        });
    }

    let mut conflicts = Vec::new();
    for (ext, required_by) in &required {
        if let Some(excluded_by) = excluded.get(ext) {
            let conflict = RequirementConflict {
                extension: ext.clone(),
                required_by: required_by.iter().cloned().collect(),
                excluded_by: excluded_by.iter().cloned().collect(),
            };
            tracing::warn!(extension = %ext, "unsatisfiable requirement: {}", conflict.describe());
            conflicts.push(conflict);
        }
        requirements.push(Requirement {
            kind: RequirementKind::ExtensionPresent,
            identifier: ext.clone(),
            declared_by: required_by.iter().cloned().collect(),
        });
    }
    for (ext, excluded_by) in excluded {
        requirements.push(Requirement {
            kind: RequirementKind::ConflictingExtension,
            identifier: ext,
            declared_by: excluded_by.into_iter().collect(),
        });
    }

    RequirementManifest::new(requirements, conflicts, warnings)
}

/// `ext-MBString` -> `mbstring`.
pub fn normalize_extension(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_prefix("ext-") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}
