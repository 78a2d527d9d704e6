//! `kiln keygen` - generate an ed25519 key pair for signing archives.

use anyhow::{Context, Result};
use clap::Args;
use kiln_core::archive::signature::{generate_signing_key, key_id};
use kiln_core::stub::IoMode;
use std::fs;
use std::path::{Path, PathBuf};

use super::report_error;
use crate::exit_codes;

pub const PRIVATE_KEY_FILE: &str = "kiln-signing.pem";
pub const PUBLIC_KEY_FILE: &str = "kiln-signing.pub.pem";

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Output directory for the key files
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Overwrite existing key files
    #[arg(long, short)]
    pub force: bool,
}

pub fn cmd_keygen(args: KeygenArgs, io: IoMode) -> i32 {
    match run_keygen(&args, io) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_error(&e, exit_codes::FAILURE),
    }
}

fn run_keygen(args: &KeygenArgs, io: IoMode) -> Result<()> {
    use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create directory: {}", args.out.display()))?;

    let private_path = args.out.join(PRIVATE_KEY_FILE);
    let public_path = args.out.join(PUBLIC_KEY_FILE);

    let existing: Vec<&Path> = [private_path.as_path(), public_path.as_path()]
        .into_iter()
        .filter(|p| p.exists())
        .collect();
    if !existing.is_empty() && !args.force && !confirm_overwrite(&existing, io)? {
        anyhow::bail!(
            "key file already exists: {} (use --force to overwrite)",
            existing[0].display()
        );
    }

    let signing_key = generate_signing_key();
    let verifying_key = signing_key.verifying_key();

    let private_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .context("failed to encode private key as PKCS#8 PEM")?;
    let public_pem = verifying_key
        .to_public_key_pem(LineEnding::LF)
        .context("failed to encode public key as SPKI PEM")?;

    fs::write(&private_path, private_pem.as_bytes())
        .with_context(|| format!("failed to write private key: {}", private_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&private_path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on: {}", private_path.display()))?;
    }
    fs::write(&public_path, public_pem)
        .with_context(|| format!("failed to write public key: {}", public_path.display()))?;

    let key_id = key_id(&verifying_key).map_err(anyhow::Error::msg)?;
    tracing::info!(%key_id, "key pair generated");

    if !io.is_quiet() {
        println!("Generated ed25519 key pair:");
        println!("  private key: {} (PKCS#8 PEM, mode 0600)", private_path.display());
        println!("  public key:  {} (SPKI PEM)", public_path.display());
        println!("  key_id:      {key_id}");
        println!();
        println!("Sign with `\"key\": \"{PRIVATE_KEY_FILE}\"` in kiln.json or `kiln compile --key`.");
    }
    Ok(())
}

/// Ask before replacing key files; never asks in non-interactive sessions.
fn confirm_overwrite(existing: &[&Path], io: IoMode) -> Result<bool> {
    if !io.interactive {
        return Ok(false);
    }
    let names: Vec<String> = existing.iter().map(|p| p.display().to_string()).collect();
    let answer = dialoguer::Confirm::new()
        .with_prompt(format!("Overwrite {}?", names.join(" and ")))
        .default(false)
        .interact()?;
    Ok(answer)
}
