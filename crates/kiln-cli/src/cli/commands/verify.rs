//! `kiln verify` - check an archive signature.

use anyhow::{Context, Result};
use clap::Args;
use kiln_core::archive::signature::load_verifying_key_pem;
use kiln_core::stub::IoMode;
use kiln_core::{verify, verify_with_key, Archive, VerificationResult};
use std::path::PathBuf;

use crate::cli::args::OutputFormat;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Archive to verify
    pub archive: PathBuf,

    /// Expected signer (SPKI PEM); the archive must be signed by this key
    #[arg(long)]
    pub public_key: Option<PathBuf>,

    /// Output format: human or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

pub fn cmd_verify(args: VerifyArgs, io: IoMode) -> i32 {
    match run_verify(&args, io) {
        Ok(result) if accepted(&result) => exit_codes::SUCCESS,
        Ok(_) => exit_codes::VERIFY_FAILED,
        // An archive that cannot be read fails verification; a bad key file
        // is a usage error.
        Err(e) => match super::report_error(&e, exit_codes::VERIFY_FAILED) {
            exit_codes::CONFIG_ERROR => exit_codes::CONFIG_ERROR,
            _ => exit_codes::VERIFY_FAILED,
        },
    }
}

fn accepted(result: &VerificationResult) -> bool {
    result.valid && result.trusted != Some(false)
}

fn run_verify(args: &VerifyArgs, io: IoMode) -> Result<VerificationResult> {
    let archive = Archive::open(&args.archive)
        .with_context(|| format!("failed to open archive {}", args.archive.display()))?;

    let result = match &args.public_key {
        Some(path) => verify_with_key(&archive, &load_verifying_key_pem(path)?),
        None => verify(&archive),
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Human if io.is_quiet() => {}
        OutputFormat::Human => print_human(args, &result),
    }
    Ok(result)
}

fn print_human(args: &VerifyArgs, result: &VerificationResult) {
    let name = args.archive.display();
    if !result.signed {
        println!("{name}: not signed");
        if result.trusted == Some(false) {
            println!("  expected a signature by the given public key");
        }
        return;
    }
    let key_id = result.key_id.as_deref().unwrap_or("unknown key");
    if result.valid {
        println!("{name}: signature valid");
    } else {
        let kind = result.kind.map_or("Invalid", |k| k.as_str());
        println!(
            "{name}: signature INVALID [{kind}]: {}",
            result.reason.as_deref().unwrap_or("unknown reason")
        );
    }
    if let Some(algorithm) = &result.algorithm {
        println!("  algorithm: {algorithm}");
    }
    println!("  key_id:    {key_id}");
    if let Some(digest) = &result.digest {
        println!("  digest:    {digest}");
    }
    match result.trusted {
        Some(true) => println!("  trusted:   yes"),
        Some(false) => println!("  trusted:   NO (signed by a different key)"),
        None => {}
    }
}
