//! Subscriber setup. `RUST_LOG` wins; otherwise the negotiated verbosity
//! picks the level.

use kiln_core::Verbosity;
use tracing_subscriber::EnvFilter;

pub fn level_for(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Verbose => "info",
        Verbosity::VeryVerbose => "debug",
        Verbosity::Debug => "trace",
    }
}

pub fn init(verbosity: Verbosity) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));
    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
