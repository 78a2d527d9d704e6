use super::args::*;
use crate::exit_codes;
use kiln_core::stub::IoMode;
use kiln_core::{ArchiveError, BuildError, ConfigError, ErrorKind};
use std::path::{Path, PathBuf};

pub mod compile;
pub mod diff;
pub mod info;
pub mod keygen;
pub mod validate;
pub mod verify;

pub fn dispatch(cli: Cli, io: IoMode) -> i32 {
    match cli.cmd {
        Command::Compile(args) => compile::cmd_compile(args, io),
        Command::Build(args) => {
            eprintln!("warning: `kiln build` is deprecated, use `kiln compile`");
            compile::cmd_compile(args, io)
        }
        Command::Diff(args) => diff::cmd_diff(args, io),
        Command::Info(args) => info::cmd_info(args, io),
        Command::Validate(args) => validate::cmd_validate(args, io),
        Command::Verify(args) => verify::cmd_verify(args, io),
        Command::Keygen(args) => keygen::cmd_keygen(args, io),
    }
}

/// Library failure kind somewhere in the chain of `err`, if any.
pub(crate) fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<BuildError>() {
            Some(e.kind())
        } else if let Some(e) = cause.downcast_ref::<ConfigError>() {
            Some(e.kind())
        } else {
            cause.downcast_ref::<ArchiveError>().map(ArchiveError::kind)
        }
    })
}

/// Print `err` as `error[<Kind>]: ...` and pick the exit code.
///
/// Errors that carry no library kind exit with `fallback`.
pub(crate) fn report_error(err: &anyhow::Error, fallback: i32) -> i32 {
    match error_kind(err) {
        Some(kind) => {
            eprintln!("error[{kind}]: {err:#}");
            exit_codes::for_kind(kind)
        }
        None => {
            eprintln!("error: {err:#}");
            fallback
        }
    }
}

/// Resolve a command-line path against the working directory.
pub(crate) fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}
