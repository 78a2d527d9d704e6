//! Bootstrap stub synthesis.
//!
//! A [`StubSynthesizer`] turns a [`RequirementManifest`] and an entry point
//! into a [`BootstrapStub`]: the self-executing `sh` preamble of an archive.
//! The stub knows nothing about the container it is prepended to beyond the
//! header line format after [`HALT_MARKER`].

pub mod check;
pub mod io;
pub mod script;

pub use check::{CheckReport, FailureKind, RequirementChecker, RequirementFailure, RuntimeProfile};
pub use io::{IoContext, IoMode, Verbosity, SHELL_VERBOSITY};

use crate::entry::normalize_logical_path;
use crate::error::{ArchiveError, BuildResult};
use crate::requirements::RequirementManifest;
use serde::{Deserialize, Serialize};

/// Line that terminates the stub.
pub const HALT_MARKER: &str = "__KILN_HALT__";

/// Runtime settings baked into generated stubs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct StubOptions {
    /// Runtime command, overridable at execution time via `KILN_RUNTIME`.
    #[serde(rename = "command")]
    pub runtime: String,
    /// Arguments that make the runtime print its version.
    pub version_probe: Vec<String>,
    /// Arguments that make the runtime list loaded extensions, one per line.
    pub extensions_probe: Vec<String>,
    pub shebang: String,
    #[serde(skip)]
    pub check_requirements: bool,
}

impl Default for StubOptions {
    fn default() -> Self {
        Self {
            runtime: "php".to_string(),
            version_probe: vec!["--version".to_string()],
            extensions_probe: vec!["-m".to_string()],
            shebang: "#!/bin/sh".to_string(),
            check_requirements: true,
        }
    }
}

/// Generated bootstrap of one build. Not shared across builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStub {
    script: String,
    entry_point: String,
    manifest: RequirementManifest,
}

impl BootstrapStub {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn manifest(&self) -> &RequirementManifest {
        &self.manifest
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// Stub bytes with `banner` inserted as comment lines after the shebang.
    pub fn render(&self, banner: Option<&str>) -> Vec<u8> {
        let banner = match banner {
            Some(b) if !b.is_empty() => b,
            _ => return self.script.as_bytes().to_vec(),
        };
        let (shebang, body) = self.script.split_once('\n').unwrap_or((self.script.as_str(), ""));

        let mut out = String::with_capacity(self.script.len() + banner.len() + 64);
        out.push_str(shebang);
        out.push('\n');
        for line in banner.lines() {
            if line.is_empty() {
                out.push_str("#\n");
            } else {
                out.push_str("# ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str(body);
        out.into_bytes()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubSynthesizer {
    options: StubOptions,
}

impl StubSynthesizer {
    pub fn new(options: StubOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &StubOptions {
        &self.options
    }

    /// Generate the stub that checks `requirements` and runs `entry_point`.
    pub fn synthesize(
        &self,
        requirements: &RequirementManifest,
        entry_point: &str,
    ) -> BuildResult<BootstrapStub> {
        let entry_point = normalize_logical_path(entry_point)?;
        script::check_embeddable(&self.options, requirements)?;
        if requirements.is_unsatisfiable() {
            for conflict in requirements.conflicts() {
                tracing::warn!("archive will refuse to run: {}", conflict.describe());
            }
        }
        tracing::debug!(
            entry = %entry_point,
            requirements = requirements.requirements().len(),
            check = self.options.check_requirements,
            "synthesizing stub"
        );
        Ok(script::render_script(&self.options, requirements, &entry_point))
    }
}

/// Values recovered from the stub of a finished archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StubInfo {
    pub runtime: String,
    pub entry_point: String,
    pub requirements: RequirementManifest,
    pub checks_requirements: bool,
    /// Probe arguments the stub runs; the defaults for stubs that predate them.
    pub version_probe: Vec<String>,
    pub extensions_probe: Vec<String>,
}

/// Read the assignments back out of stub bytes (everything up to the halt
/// marker is enough).
pub fn inspect(stub: &[u8]) -> Result<StubInfo, ArchiveError> {
    let text = String::from_utf8_lossy(stub);
    let mut runtime = None;
    let mut entry_point = None;
    let mut requirements = None;
    let mut version_probe = None;
    let mut extensions_probe = None;

    for line in text.lines() {
        if line == HALT_MARKER {
            break;
        }
        if let Some(rest) = line.strip_prefix("KILN_RUNTIME=${KILN_RUNTIME:-") {
            runtime = rest.strip_suffix('}').and_then(script::shell_unquote);
        } else if let Some(rest) = line.strip_prefix("KILN_ENTRY=") {
            entry_point = script::shell_unquote(rest);
        } else if let Some(rest) = line.strip_prefix("KILN_REQUIREMENTS=") {
            let json = script::shell_unquote(rest)
                .ok_or_else(|| ArchiveError::malformed("unreadable KILN_REQUIREMENTS in stub"))?;
            requirements = Some(RequirementManifest::from_json(&json).map_err(|e| {
                ArchiveError::malformed(format!("invalid requirement manifest in stub: {e}"))
            })?);
        } else if line.starts_with(script::VERSION_PROBE_FN) {
            version_probe = Some(
                script::probe_args(line, script::VERSION_PROBE_FN)
                    .ok_or_else(|| ArchiveError::malformed("unreadable version probe in stub"))?,
            );
        } else if line.starts_with(script::EXTENSIONS_PROBE_FN) {
            extensions_probe = Some(
                script::probe_args(line, script::EXTENSIONS_PROBE_FN)
                    .ok_or_else(|| ArchiveError::malformed("unreadable extensions probe in stub"))?,
            );
        }
    }
    let defaults = StubOptions::default();

    Ok(StubInfo {
        runtime: runtime.ok_or_else(|| ArchiveError::malformed("stub does not set KILN_RUNTIME"))?,
        entry_point: entry_point.ok_or_else(|| ArchiveError::malformed("stub does not set KILN_ENTRY"))?,
        requirements: requirements
            .ok_or_else(|| ArchiveError::malformed("stub does not set KILN_REQUIREMENTS"))?,
        checks_requirements: text.contains("KILN_REQUIREMENT_CHECKER"),
        version_probe: version_probe.unwrap_or(defaults.version_probe),
        extensions_probe: extensions_probe.unwrap_or(defaults.extensions_probe),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SourceInventory;
    use crate::requirements::{analyze, DependencyEntry};

    fn manifest() -> RequirementManifest {
        analyze(
            &[DependencyEntry::new("root")
                .with_constraint("^8.1")
                .requires("json")
                .excludes("xdebug")],
            &SourceInventory::default(),
        )
    }

    #[test]
    fn stub_embeds_manifest_and_entry_point() {
        let stub = StubSynthesizer::default()
            .synthesize(&manifest(), "./bin/app.php")
            .unwrap();
        assert_eq!(stub.entry_point(), "bin/app.php");
        let script = stub.script();
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.ends_with("\n__KILN_HALT__\n"));
        assert!(script.contains("KILN_ENTRY='bin/app.php'\n"));
        assert!(script.contains("kiln_require_version '8.1.0' 'root'"));
        assert!(script.contains("kiln_require_extension 'json' 'root'"));
        assert!(script.contains("kiln_reject_extension 'xdebug' 'root'"));
        assert!(script.contains("kiln_version_probe() { \"$KILN_RUNTIME\" '--version'; }\n"));
        assert!(script.contains("kiln_extensions_probe() { \"$KILN_RUNTIME\" '-m'; }\n"));
        assert!(script.contains("kiln_runtime_version=$(kiln_version_probe 2>/dev/null"));
        assert!(script.contains("kiln_runtime_extensions=$(kiln_extensions_probe 2>/dev/null)"));
    }

    #[test]
    fn check_can_be_disabled() {
        let options = StubOptions {
            check_requirements: false,
            ..StubOptions::default()
        };
        let stub = StubSynthesizer::new(options).synthesize(&manifest(), "app.php").unwrap();
        assert!(!stub.script().contains("kiln_require_version"));
        assert!(!stub.script().contains("KILN_REQUIREMENT_CHECKER"));
    }

    #[test]
    fn conflicts_become_unconditional_failures() {
        let m = analyze(
            &[
                DependencyEntry::new("a").requires("apcu"),
                DependencyEntry::new("b").excludes("apcu"),
            ],
            &SourceInventory::default(),
        );
        let stub = StubSynthesizer::default().synthesize(&m, "app.php").unwrap();
        assert!(stub
            .script()
            .contains("kiln_fail unsatisfiable 'apcu' 'extension apcu is required by a and excluded by b'"));
    }

    #[test]
    fn invalid_entry_point_is_rejected() {
        let err = StubSynthesizer::default()
            .synthesize(&RequirementManifest::empty(), "../outside.php")
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidMemberPath);
    }

    #[test]
    fn banner_goes_after_shebang() {
        let stub = StubSynthesizer::default()
            .synthesize(&RequirementManifest::empty(), "app.php")
            .unwrap();
        let rendered = String::from_utf8(stub.render(Some("Acme App\n\n(c) Acme"))).unwrap();
        assert!(rendered.starts_with("#!/bin/sh\n# Acme App\n#\n# (c) Acme\n# kiln bootstrap"));
        assert_eq!(stub.render(None), stub.script().as_bytes());
        assert_eq!(stub.render(Some("")), stub.script().as_bytes());
    }

    #[test]
    fn inspect_recovers_stub_values() {
        let options = StubOptions {
            runtime: "/opt/php/bin/php".into(),
            version_probe: vec!["-d".into(), "display_errors=0".into(), "-v".into()],
            extensions_probe: vec!["-r".into(), "echo implode(\"\\n\", get_loaded_extensions());".into()],
            ..StubOptions::default()
        };
        let m = manifest();
        let stub = StubSynthesizer::new(options.clone()).synthesize(&m, "bin/it's.php").unwrap();
        let info = inspect(&stub.render(Some("banner"))).unwrap();
        assert_eq!(info.runtime, "/opt/php/bin/php");
        assert_eq!(info.entry_point, "bin/it's.php");
        assert_eq!(info.requirements.requirements(), m.requirements());
        assert!(info.checks_requirements);
        assert_eq!(info.version_probe, options.version_probe);
        assert_eq!(info.extensions_probe, options.extensions_probe);
    }

    #[test]
    fn inspect_falls_back_to_default_runtime_arguments() {
        let stub = b"#!/bin/sh\nKILN_RUNTIME=${KILN_RUNTIME:-'php'}\nKILN_ENTRY='a.php'\nKILN_REQUIREMENTS='{\"requirements\":[]}'\n__KILN_HALT__\n";
        let info = inspect(stub).unwrap();
        assert_eq!(info.version_probe, vec!["--version"]);
        assert_eq!(info.extensions_probe, vec!["-m"]);
    }

    #[test]
    fn line_breaks_cannot_leak_into_the_script() {
        let runtime = StubOptions {
            runtime: "php\nrm -rf ~".into(),
            ..StubOptions::default()
        };
        let err = StubSynthesizer::new(runtime)
            .synthesize(&RequirementManifest::empty(), "app.php")
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedOption);
        assert!(err.to_string().contains("runtime command"), "{err}");

        let probe = StubOptions {
            version_probe: vec!["-v\r".into()],
            ..StubOptions::default()
        };
        assert!(StubSynthesizer::new(probe)
            .synthesize(&RequirementManifest::empty(), "app.php")
            .is_err());

        let hostile = analyze(
            &[DependencyEntry::new("evil\ntouch /tmp/pwned").requires("json")],
            &SourceInventory::default(),
        );
        let err = StubSynthesizer::default().synthesize(&hostile, "app.php").unwrap_err();
        assert!(err.to_string().contains("dependency name"), "{err}");

        let extension = analyze(
            &[DependencyEntry::new("ok").requires("json\nid")],
            &SourceInventory::default(),
        );
        assert!(StubSynthesizer::default().synthesize(&extension, "app.php").is_err());
    }

    #[test]
    fn inspect_rejects_foreign_scripts() {
        let err = inspect(b"#!/bin/sh\necho hi\n__KILN_HALT__\n").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedArchive);
    }
}
