use clap::Parser;

mod cli;
pub mod exit_codes;
mod logging;

use cli::args::Cli;
use cli::commands::dispatch;
use kiln_core::stub::{IoContext, IoMode};

fn main() {
    // Negotiated from the raw argv so SHELL_VERBOSITY and `--verbose=N`
    // behave exactly as they do in generated stubs.
    let io = IoMode::derive(&IoContext::from_env());
    logging::init(io.verbosity);

    let cli = Cli::parse();
    tracing::debug!(verbosity = %io.verbosity, interactive = io.interactive, "io negotiated");
    std::process::exit(dispatch(cli, io));
}
