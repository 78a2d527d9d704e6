//! `kiln compile` - build an archive from `kiln.json`.

use anyhow::{Context, Result};
use clap::Args;
use kiln_core::stub::IoMode;
use kiln_core::{compile, BuildConfig, CompileOverrides, CompileReport, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;

use super::{absolute, report_error};
use crate::cli::args::OutputFormat;
use crate::exit_codes;

#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Build configuration file
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Output archive (overrides `output` in the config)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Payload compression: none, gzip or zstd
    #[arg(long)]
    pub compression: Option<String>,

    /// PKCS#8 PEM ed25519 private key to sign with
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Store every member verbatim
    #[arg(long)]
    pub no_compactors: bool,

    /// Output format: human or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

pub fn cmd_compile(args: CompileArgs, io: IoMode) -> i32 {
    match run_compile(&args, io) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_error(&e, exit_codes::FAILURE),
    }
}

fn run_compile(args: &CompileArgs, io: IoMode) -> Result<()> {
    let config = BuildConfig::load(&args.config)?;
    let overrides = CompileOverrides {
        output: args.output.as_deref().map(absolute).transpose()?,
        compression: args.compression.clone(),
        key: args.key.as_deref().map(absolute).transpose()?,
        no_compactors: args.no_compactors,
        cancel: None,
    };

    let report = compile(&config, &overrides)
        .with_context(|| format!("failed to compile {}", args.config.display()))?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human => print_human(&report, io),
    }
    Ok(())
}

fn print_human(report: &CompileReport, io: IoMode) {
    for warning in &report.warnings {
        eprintln!("warning[{}]: {}", warning.kind, warning.message);
    }
    if io.is_quiet() {
        return;
    }

    let summary = &report.summary;
    println!("Compiled {}", summary.output.display());
    println!("  entry point: {}", report.entry_point);
    println!("  members:     {}", summary.members);
    println!("  size:        {} bytes", summary.bytes);
    println!("  compression: {}", summary.compression);
    match &summary.key_id {
        Some(key_id) => println!("  signed:      yes ({key_id})"),
        None => println!("  signed:      no"),
    }
    println!("  sha256:      {}", summary.sha256);
    if !report.requirements.is_empty() {
        println!("  requirements:");
        for req in report.requirements.requirements() {
            println!(
                "    {} {} ({})",
                req.kind.as_str(),
                req.identifier,
                req.declared_by.join(", ")
            );
        }
    }
}
