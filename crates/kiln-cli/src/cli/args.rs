use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use super::commands::{compile, diff, info, keygen, validate, verify};

#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Compile application trees into reproducible, signed, self-executing archives"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

/// Accepted here so clap does not reject them; the effective levels are
/// negotiated from the raw argv before parsing.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More output (-v, -vv, -vvv)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Verbosity level: 1 verbose, 2 very verbose, 3 debug
    #[arg(
        long = "verbose",
        value_name = "LEVEL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "1",
        global = true
    )]
    pub verbose_level: Option<String>,

    /// Never ask questions
    #[arg(short = 'n', long, global = true)]
    pub no_interaction: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the configured application into an archive
    Compile(compile::CompileArgs),
    /// Deprecated: use `compile`
    #[command(hide = true)]
    Build(compile::CompileArgs),
    /// Compare the members of two archives
    Diff(diff::DiffArgs),
    /// Describe an archive, or this tool when no archive is given
    Info(info::InfoArgs),
    /// Check a build configuration without building
    Validate(validate::ValidateArgs),
    /// Verify an archive signature
    Verify(verify::VerifyArgs),
    /// Generate an ed25519 key pair for signing
    Keygen(keygen::KeygenArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["kiln", "diff", "a.kiln", "b.kiln", "-vv", "--verbose=3", "-n"])
            .unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.verbose_level.as_deref(), Some("3"));
        assert!(cli.global.no_interaction);
        assert!(matches!(cli.cmd, Command::Diff(_)));
    }

    #[test]
    fn build_is_a_hidden_alias() {
        let cli = Cli::try_parse_from(["kiln", "build", "--compression", "gzip"]).unwrap();
        assert!(matches!(cli.cmd, Command::Build(ref a) if a.compression.as_deref() == Some("gzip")));
    }
}
