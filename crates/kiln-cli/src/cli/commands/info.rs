//! `kiln info` - describe an archive, or this tool.

use anyhow::{Context, Result};
use clap::Args;
use kiln_core::archive::{MemberInfo, SignatureAlgorithm};
use kiln_core::stub::{CheckReport, IoMode, RequirementChecker, RuntimeProfile, StubInfo};
use kiln_core::{verify, Archive, Compression, StubOptions, VerificationResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::report_error;
use crate::cli::args::OutputFormat;
use crate::exit_codes;

const COMPACTORS: &[&str] = &["source", "json", "none"];

#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    /// Archive to describe; without it, describe this tool
    #[arg(value_name = "ARCHIVE")]
    pub archive: Option<PathBuf>,

    /// List members with size and digest
    #[arg(long, requires = "archive")]
    pub list: bool,

    /// Check the embedded requirements against a runtime on this machine
    #[arg(long, requires = "archive")]
    pub check: bool,

    /// Runtime command for --check (defaults to the one in the stub)
    #[arg(long, requires = "check")]
    pub runtime: Option<String>,

    /// Output format: human or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ToolInfo {
    version: &'static str,
    compressions: Vec<&'static str>,
    signature_algorithms: Vec<&'static str>,
    compactors: &'static [&'static str],
    default_runtime: String,
}

#[derive(Debug, Serialize)]
struct ArchiveInfo {
    path: PathBuf,
    bytes: usize,
    compression: Compression,
    payload_bytes: usize,
    member_count: usize,
    stub: StubInfo,
    signature: VerificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    members: Option<Vec<MemberInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<CheckReport>,
}

pub fn cmd_info(args: InfoArgs, io: IoMode) -> i32 {
    let result = match &args.archive {
        Some(path) => run_archive_info(path, &args, io),
        None => run_tool_info(&args).map(|()| exit_codes::SUCCESS),
    };
    result.unwrap_or_else(|e| report_error(&e, exit_codes::FAILURE))
}

fn run_tool_info(args: &InfoArgs) -> Result<()> {
    let info = ToolInfo {
        version: env!("CARGO_PKG_VERSION"),
        compressions: Compression::ALL.iter().map(|c| c.as_str()).collect(),
        signature_algorithms: SignatureAlgorithm::ALL.iter().map(|a| a.as_str()).collect(),
        compactors: COMPACTORS,
        default_runtime: StubOptions::default().runtime,
    };
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Human => {
            println!("kiln {}", info.version);
            println!("  compressions:         {}", info.compressions.join(", "));
            println!("  signature algorithms: {}", info.signature_algorithms.join(", "));
            println!("  compactors:           {}", info.compactors.join(", "));
            println!("  default runtime:      {}", info.default_runtime);
        }
    }
    Ok(())
}

fn run_archive_info(path: &Path, args: &InfoArgs, io: IoMode) -> Result<i32> {
    let archive =
        Archive::open(path).with_context(|| format!("failed to open archive {}", path.display()))?;
    let stub = archive
        .stub_info()
        .with_context(|| format!("failed to read stub of {}", path.display()))?;

    let check = args.check.then(|| {
        let runtime = args.runtime.clone().unwrap_or_else(|| stub.runtime.clone());
        let profile = RuntimeProfile::probe(&runtime, &stub.version_probe, &stub.extensions_probe);
        RequirementChecker.check(&stub.requirements, &profile)
    });
    let code = match &check {
        Some(report) if !report.is_satisfied() => exit_codes::FAILURE,
        _ => exit_codes::SUCCESS,
    };

    let info = ArchiveInfo {
        path: path.to_path_buf(),
        bytes: archive.bytes().len(),
        compression: archive.compression(),
        payload_bytes: archive.layout().payload.len(),
        member_count: archive.len(),
        signature: verify(&archive),
        members: args.list.then(|| archive.members()),
        stub,
        check,
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Human if io.is_quiet() => {
            if let Some(check) = &info.check {
                eprint!("{}", check.to_lines());
            }
        }
        OutputFormat::Human => print_human(&info),
    }
    Ok(code)
}

fn print_human(info: &ArchiveInfo) {
    println!("Archive {}", info.path.display());
    println!("  size:        {} bytes", info.bytes);
    println!("  compression: {} ({} payload bytes)", info.compression, info.payload_bytes);
    println!("  members:     {}", info.member_count);
    println!("  entry point: {}", info.stub.entry_point);
    println!("  runtime:     {}", info.stub.runtime);

    let sig = &info.signature;
    let signed = match (sig.signed, sig.valid) {
        (false, _) => "no".to_string(),
        (true, true) => format!("yes ({})", sig.key_id.as_deref().unwrap_or("unknown key")),
        (true, false) => format!("INVALID ({})", sig.reason.as_deref().unwrap_or("unknown reason")),
    };
    println!("  signed:      {signed}");

    let manifest = &info.stub.requirements;
    if manifest.is_empty() {
        println!("  requirements: none");
    } else {
        println!(
            "  requirements:{}",
            if info.stub.checks_requirements { "" } else { " (not checked)" }
        );
        for req in manifest.requirements() {
            println!("    {} {} ({})", req.kind.as_str(), req.identifier, req.declared_by.join(", "));
        }
        for conflict in manifest.conflicts() {
            println!("    unsatisfiable: {}", conflict.describe());
        }
    }

    if let Some(members) = &info.members {
        println!("  files:");
        for m in members {
            println!("    {:>10}  {}  {}", m.size, m.sha256, m.path);
        }
    }

    if let Some(check) = &info.check {
        if check.is_satisfied() {
            println!("  check:       all requirements satisfied");
        } else {
            println!("  check:       {} failure(s)", check.failures.len());
            for failure in &check.failures {
                println!("    [{}] {}: {}", failure.kind.as_str(), failure.identifier, failure.detail);
            }
        }
    }
}
