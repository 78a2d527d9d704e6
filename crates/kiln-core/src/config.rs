//! Build configuration (`kiln.json`).
//!
//! Relative paths resolve against the directory containing the config file.

use crate::archive::signature::load_signing_key_pem;
use crate::archive::Compression;
use crate::compactor::CompactorChain;
use crate::discovery::exclude_set;
use crate::error::{BuildResult, ConfigError};
use crate::requirements::DependencyEntry;
use crate::stub::StubOptions;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "kiln.json";
pub const DEFAULT_OUTPUT: &str = "app.kiln";

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_source_extensions() -> Vec<String> {
    ["php", "phtml", "inc"].map(String::from).to_vec()
}

fn default_manifest_extensions() -> Vec<String> {
    vec!["json".to_string()]
}

fn default_compression() -> String {
    Compression::None.as_str().to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildConfig {
    /// Root of the application tree; logical paths are relative to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
    /// Entry point, relative to `base-path`.
    pub main: String,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
    /// Glob patterns matched against logical paths.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
    #[serde(default = "default_manifest_extensions")]
    pub manifest_extensions: Vec<String>,
    #[serde(default)]
    pub compactors: Vec<String>,
    #[serde(default = "default_compression")]
    pub compression: String,
    /// PKCS#8 PEM ed25519 private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    /// Resolved dependency manifest (JSON array of dependency entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub check_requirements: bool,
    #[serde(default)]
    pub runtime: StubOptions,
    #[serde(default)]
    pub workers: usize,

    #[serde(skip)]
    root: PathBuf,
}

impl BuildConfig {
    /// Minimal configuration rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, main: impl Into<String>) -> Self {
        Self {
            base_path: None,
            main: main.into(),
            output: default_output(),
            files: Vec::new(),
            directories: Vec::new(),
            exclude: Vec::new(),
            source_extensions: default_source_extensions(),
            manifest_extensions: default_manifest_extensions(),
            compactors: Vec::new(),
            compression: default_compression(),
            key: None,
            banner: None,
            dependencies: None,
            check_requirements: true,
            runtime: StubOptions::default(),
            workers: 0,
            root: root.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let root = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let config = Self::from_json(&text, root).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(config = %path.display(), main = %config.main, "configuration loaded");
        Ok(config)
    }

    pub fn from_json(json: &str, root: impl Into<PathBuf>) -> Result<Self, serde_json::Error> {
        let mut config: Self = serde_json::from_str(json)?;
        config.root = root.into();
        Ok(config)
    }

    /// Directory relative paths resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        match &self.base_path {
            Some(base) => self.resolve(base),
            None => self.root.clone(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.output)
    }

    pub fn compression(&self) -> BuildResult<Compression> {
        self.compression.parse()
    }

    pub fn compactor_chain(&self) -> BuildResult<CompactorChain> {
        CompactorChain::from_names(&self.compactors)
    }

    pub fn signing_key(&self) -> Result<Option<SigningKey>, ConfigError> {
        self.key
            .as_deref()
            .map(|key| load_signing_key_pem(&self.resolve(key)))
            .transpose()
    }

    /// Resolved dependency entries; empty when none are configured.
    pub fn load_dependencies(&self) -> Result<Vec<DependencyEntry>, ConfigError> {
        let Some(path) = self.dependencies.as_deref() else {
            return Ok(Vec::new());
        };
        let path = self.resolve(path);
        let error = |message: String| ConfigError::Dependencies {
            path: path.display().to_string(),
            message,
        };
        let text = std::fs::read_to_string(&path).map_err(|e| error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| error(e.to_string()))
    }

    pub fn stub_options(&self) -> StubOptions {
        StubOptions {
            check_requirements: self.check_requirements,
            ..self.runtime.clone()
        }
    }

    /// Every problem found in the configuration; empty when it is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let base = self.base_dir();

        if self.main.trim().is_empty() {
            problems.push("main: entry point is empty".to_string());
        } else if let Err(e) = crate::entry::normalize_logical_path(&self.main) {
            problems.push(format!("main: {e}"));
        } else if !base.join(&self.main).is_file() {
            problems.push(format!("main: {} does not exist", base.join(&self.main).display()));
        }
        if !base.is_dir() {
            problems.push(format!("base-path: {} is not a directory", base.display()));
        }
        for file in &self.files {
            if !base.join(file).is_file() {
                problems.push(format!("files: {} does not exist", base.join(file).display()));
            }
        }
        for dir in &self.directories {
            if !base.join(dir).is_dir() {
                problems.push(format!("directories: {} is not a directory", base.join(dir).display()));
            }
        }
        if let Err(e) = exclude_set(&self.exclude) {
            problems.push(format!("exclude: {e}"));
        }
        if let Err(e) = self.compression() {
            problems.push(format!("compression: {e}"));
        }
        if let Err(e) = self.compactor_chain() {
            problems.push(format!("compactors: {e}"));
        }
        if let Err(e) = self.signing_key() {
            problems.push(format!("key: {e}"));
        }
        if let Err(e) = self.load_dependencies() {
            problems.push(format!("dependencies: {e}"));
        }
        if self.runtime.runtime.trim().is_empty() {
            problems.push("runtime.command: empty".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_apply() {
        let config = BuildConfig::from_json(r#"{"main": "bin/app.php"}"#, "/srv/app").unwrap();
        assert_eq!(config.output_path(), PathBuf::from("/srv/app/app.kiln"));
        assert_eq!(config.source_extensions, vec!["php", "phtml", "inc"]);
        assert_eq!(config.compression().unwrap(), Compression::None);
        assert!(config.check_requirements);
        assert_eq!(config.stub_options().runtime, "php");
        assert!(config.compactor_chain().unwrap().compactors().is_empty());
    }

    #[test]
    fn kebab_case_keys_and_runtime_section() {
        let json = r#"{
            "main": "index.php",
            "base-path": "src",
            "compression": "zstd",
            "compactors": ["source", "json"],
            "check-requirements": false,
            "runtime": {"command": "php8.3", "version-probe": ["-v"]}
        }"#;
        let config = BuildConfig::from_json(json, "/w").unwrap();
        assert_eq!(config.base_dir(), PathBuf::from("/w/src"));
        assert_eq!(config.compression().unwrap(), Compression::Zstd);
        let stub = config.stub_options();
        assert_eq!(stub.runtime, "php8.3");
        assert_eq!(stub.version_probe, vec!["-v"]);
        assert_eq!(stub.extensions_probe, vec!["-m"]);
        assert!(!stub.check_requirements);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(BuildConfig::from_json(r#"{"main": "a.php", "compresion": "gzip"}"#, ".").is_err());
        assert!(BuildConfig::from_json(r#"{"output": "x"}"#, ".").is_err());
    }

    #[test]
    fn validate_reports_every_problem() {
        let dir = TempDir::new().unwrap();
        let json = r#"{
            "main": "missing.php",
            "compression": "bzip2",
            "compactors": ["yaml"],
            "exclude": ["a{b"],
            "directories": ["nope"]
        }"#;
        let config = BuildConfig::from_json(json, dir.path()).unwrap();
        let problems = config.validate();
        for prefix in ["main:", "compression:", "compactors:", "exclude:", "directories:"] {
            assert!(
                problems.iter().any(|p| p.starts_with(prefix)),
                "missing {prefix} in {problems:?}"
            );
        }
    }

    #[test]
    fn valid_tree_has_no_problems() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/app.php"), "<?php").unwrap();
        std::fs::write(
            dir.path().join("deps.json"),
            r#"[{"name": "root", "constraint": ">=8.1"}]"#,
        )
        .unwrap();
        let mut config = BuildConfig::new(dir.path(), "bin/app.php");
        config.dependencies = Some(PathBuf::from("deps.json"));
        assert_eq!(config.validate(), Vec::<String>::new());
        assert_eq!(config.load_dependencies().unwrap()[0].name, "root");
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        let err = BuildConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("kiln.json"));
    }
}
