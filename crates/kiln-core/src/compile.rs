//! End-to-end compilation: config → discovery → requirements → stub → archive.

use crate::archive::{ArchiveBuilder, BuildOptions, BuildSummary};
use crate::compactor::CompactorChain;
use crate::config::BuildConfig;
use crate::discovery::discover;
use crate::error::{BuildResult, ErrorKind};
use crate::requirements::{analyze, RequirementManifest};
use crate::stub::StubSynthesizer;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Command-line values that take precedence over `kiln.json`.
#[derive(Debug, Clone, Default)]
pub struct CompileOverrides {
    pub output: Option<PathBuf>,
    pub compression: Option<String>,
    pub key: Option<PathBuf>,
    pub no_compactors: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Non-fatal finding reported alongside a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompileReport {
    #[serde(flatten)]
    pub summary: BuildSummary,
    pub entry_point: String,
    pub requirements: RequirementManifest,
    pub warnings: Vec<Diagnostic>,
}

pub fn compile(config: &BuildConfig, overrides: &CompileOverrides) -> BuildResult<CompileReport> {
    let mut config = config.clone();
    if let Some(output) = &overrides.output {
        config.output = output.clone();
    }
    if let Some(compression) = &overrides.compression {
        config.compression = compression.clone();
    }
    if let Some(key) = &overrides.key {
        config.key = Some(key.clone());
    }

    // Option errors surface before any source is touched.
    let compression = config.compression()?;
    let chain = if overrides.no_compactors {
        CompactorChain::pass_through()
    } else {
        config.compactor_chain()?
    };
    let signing_key = config.signing_key()?;
    let dependencies = config.load_dependencies()?;

    let found = discover(&config)?;
    let manifest = analyze(&dependencies, &found.inventory);
    let stub = StubSynthesizer::new(config.stub_options()).synthesize(&manifest, &config.main)?;

    let builder = ArchiveBuilder::new(
        chain,
        BuildOptions {
            compression,
            signing_key,
            banner: config.banner.clone(),
            workers: config.workers,
            cancel: overrides.cancel.clone(),
        },
    );
    let summary = builder.build_to_path(&found.entries, &stub, &config.output_path())?;

    let mut warnings: Vec<Diagnostic> = manifest
        .conflicts()
        .iter()
        .map(|c| Diagnostic {
            kind: ErrorKind::UnsatisfiableRequirement,
            message: c.describe(),
        })
        .collect();
    warnings.extend(manifest.warnings().iter().map(|w| Diagnostic {
        kind: ErrorKind::Config,
        message: w.clone(),
    }));

    tracing::info!(
        output = %summary.output.display(),
        members = summary.members,
        warnings = warnings.len(),
        "compile finished"
    );
    Ok(CompileReport {
        summary,
        entry_point: stub.entry_point().to_string(),
        requirements: manifest,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/app.php"), "<?php // entry\necho 1;\n").unwrap();
        dir
    }

    #[test]
    fn overrides_take_precedence() {
        let dir = project();
        let config = BuildConfig::new(dir.path(), "bin/app.php");
        let overrides = CompileOverrides {
            output: Some(PathBuf::from("out.kiln")),
            compression: Some("gzip".into()),
            ..Default::default()
        };
        let report = compile(&config, &overrides).unwrap();
        assert_eq!(report.summary.output, dir.path().join("out.kiln"));
        let archive = Archive::open(&report.summary.output).unwrap();
        assert_eq!(archive.compression(), crate::archive::Compression::Gzip);
        assert_eq!(report.entry_point, "bin/app.php");
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn unknown_compression_fails_before_writing() {
        let dir = project();
        let config = BuildConfig::new(dir.path(), "bin/app.php");
        let overrides = CompileOverrides {
            compression: Some("bzip2".into()),
            ..Default::default()
        };
        let err = compile(&config, &overrides).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOption);
        assert!(!config.output_path().exists());
    }

    #[test]
    fn no_compactors_keeps_sources_verbatim() {
        let dir = project();
        let mut config = BuildConfig::new(dir.path(), "bin/app.php");
        config.compactors = vec!["source".into()];
        let overrides = CompileOverrides {
            no_compactors: true,
            ..Default::default()
        };
        let report = compile(&config, &overrides).unwrap();
        let archive = Archive::open(&report.summary.output).unwrap();
        assert_eq!(
            archive.read_member("bin/app.php").unwrap(),
            b"<?php // entry\necho 1;\n"
        );
    }

    #[test]
    fn conflicts_become_warnings() {
        let dir = project();
        fs::write(
            dir.path().join("deps.json"),
            r#"[
                {"name": "a/a", "require-extensions": ["ext-intl"]},
                {"name": "b/b", "exclude-extensions": ["intl"]},
                {"name": "c/c", "constraint": "not a version"}
            ]"#,
        )
        .unwrap();
        let mut config = BuildConfig::new(dir.path(), "bin/app.php");
        config.dependencies = Some(PathBuf::from("deps.json"));
        let report = compile(&config, &CompileOverrides::default()).unwrap();
        let kinds: Vec<_> = report.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::UnsatisfiableRequirement, ErrorKind::Config]);
        assert!(report.requirements.is_unsatisfiable());
    }
}
