//! Source discovery: turns a [`BuildConfig`] into source entries.
//!
//! Files are not read here; the builder reads them when it reaches them.

use crate::config::BuildConfig;
use crate::entry::{normalize_logical_path, FileKind, SourceEntry, SourceInventory};
use crate::error::{BuildError, BuildResult, ConfigError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Entries selected for one build, sorted by logical path.
#[derive(Debug, Clone)]
pub struct Discovered {
    pub entries: Vec<SourceEntry>,
    pub inventory: SourceInventory,
}

pub fn exclude_set(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ConfigError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConfigError::Pattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

pub fn discover(config: &BuildConfig) -> BuildResult<Discovered> {
    let base = config.base_dir();
    let exclude = exclude_set(&config.exclude)?;
    let mut selected: BTreeMap<String, PathBuf> = BTreeMap::new();
    let reserved = reserved_paths(config);

    let main = normalize_logical_path(&config.main)?;
    selected.insert(main.clone(), base.join(&main));

    for file in &config.files {
        let logical = normalize_logical_path(file)?;
        if exclude.is_match(&logical) {
            tracing::debug!(path = %logical, "excluded");
            continue;
        }
        let origin = base.join(&logical);
        if reserved.matches(&origin) {
            tracing::debug!(path = %logical, "build artifact skipped");
            continue;
        }
        selected.insert(logical, origin);
    }

    for dir in &config.directories {
        let root = base.join(dir);
        for item in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
            let item = item.map_err(|e| {
                let origin = e
                    .path()
                    .map_or_else(|| root.display().to_string(), |p| p.display().to_string());
                BuildError::SourceUnavailable {
                    path: dir.clone(),
                    origin,
                    source: e.into(),
                }
            })?;
            if !item.file_type().is_file() {
                continue;
            }
            let logical = logical_path(&base, item.path())?;
            if exclude.is_match(&logical) {
                tracing::debug!(path = %logical, "excluded");
                continue;
            }
            if reserved.matches(item.path()) {
                tracing::debug!(path = %logical, "build artifact skipped");
                continue;
            }
            selected.insert(logical, item.into_path());
        }
    }

    let entries: Vec<SourceEntry> = selected
        .into_iter()
        .map(|(logical, origin)| {
            let kind = FileKind::detect(&logical, &config.source_extensions, &config.manifest_extensions);
            SourceEntry::from_file(logical, origin, kind)
        })
        .collect();
    let inventory = SourceInventory::from_entries(&entries);
    tracing::info!(entries = entries.len(), base = %base.display(), "sources discovered");

    Ok(Discovered { entries, inventory })
}

/// Files the build itself writes or reads as secrets: the output archive and
/// the signing key. They never become members, even under a walked directory.
struct ReservedPaths(Vec<PathBuf>);

impl ReservedPaths {
    fn matches(&self, path: &Path) -> bool {
        !self.0.is_empty() && path.canonicalize().is_ok_and(|p| self.0.contains(&p))
    }
}

fn reserved_paths(config: &BuildConfig) -> ReservedPaths {
    let key = config.key.as_deref().map(|k| config.resolve(k));
    ReservedPaths(
        std::iter::once(config.output_path())
            .chain(key)
            .filter_map(|p| p.canonicalize().ok())
            .collect(),
    )
}

fn logical_path(base: &Path, path: &Path) -> BuildResult<String> {
    let relative = path.strip_prefix(base).map_err(|_| BuildError::InvalidMemberPath {
        path: path.display().to_string(),
    })?;
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    normalize_logical_path(&joined)
}
