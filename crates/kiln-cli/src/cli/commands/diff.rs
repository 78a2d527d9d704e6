use anyhow::{Context, Result};
use clap::Args;
use kiln_core::stub::IoMode;
use kiln_core::{diff, Archive, DiffReport};
use std::path::PathBuf;

use super::report_error;
use crate::cli::args::OutputFormat;
use crate::exit_codes;

#[derive(Debug, Args, Clone)]
pub struct DiffArgs {
    /// Baseline archive
    #[arg(value_name = "BASELINE")]
    pub baseline: PathBuf,

    /// Candidate archive
    #[arg(value_name = "CANDIDATE")]
    pub candidate: PathBuf,

    /// Output format: human or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

/// Exit 0 when the member tables match, 1 when they differ, 2 when either
/// archive cannot be read.
pub fn cmd_diff(args: DiffArgs, io: IoMode) -> i32 {
    match run_diff(&args, io) {
        Ok(report) if report.is_empty() => exit_codes::SUCCESS,
        Ok(_) => exit_codes::FAILURE,
        Err(e) => {
            report_error(&e, exit_codes::CONFIG_ERROR);
            exit_codes::CONFIG_ERROR
        }
    }
}

fn run_diff(args: &DiffArgs, io: IoMode) -> Result<DiffReport> {
    let baseline = Archive::open(&args.baseline)
        .with_context(|| format!("failed to open baseline {}", args.baseline.display()))?;
    let candidate = Archive::open(&args.candidate)
        .with_context(|| format!("failed to open candidate {}", args.candidate.display()))?;

    let report = diff(&baseline, &candidate);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human if io.is_quiet() => {}
        OutputFormat::Human => {
            for path in &report.added {
                println!("+ {path}");
            }
            for path in &report.removed {
                println!("- {path}");
            }
            for changed in &report.changed {
                println!("~ {} ({} -> {})", changed.path, changed.before, changed.after);
            }
            if report.is_empty() {
                println!("No differences found.");
            } else {
                println!(
                    "{} added, {} removed, {} changed",
                    report.added.len(),
                    report.removed.len(),
                    report.changed.len()
                );
            }
        }
    }
    Ok(report)
}
