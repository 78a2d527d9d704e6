use anyhow::Result;
use clap::Args;
use kiln_core::stub::IoMode;
use kiln_core::{discover, BuildConfig, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;

use super::report_error;
use crate::exit_codes;

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Build configuration file
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

pub fn cmd_validate(args: ValidateArgs, io: IoMode) -> i32 {
    match run_validate(&args, io) {
        Ok(code) => code,
        Err(e) => report_error(&e, exit_codes::CONFIG_ERROR),
    }
}

fn run_validate(args: &ValidateArgs, io: IoMode) -> Result<i32> {
    let config = BuildConfig::load(&args.config)?;

    let problems = config.validate();
    if !problems.is_empty() {
        eprintln!("{} is invalid:", args.config.display());
        for problem in &problems {
            eprintln!("  - {problem}");
        }
        return Ok(exit_codes::CONFIG_ERROR);
    }

    let found = discover(&config)?;
    if !io.is_quiet() {
        println!(
            "{} is valid: {} files, output {}",
            args.config.display(),
            found.entries.len(),
            config.output_path().display()
        );
    }
    Ok(exit_codes::SUCCESS)
}
