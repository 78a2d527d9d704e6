//! IO mode negotiation for the bootstrap stub.
//!
//! The same rules are emitted as shell code by [`super::script`]; this module
//! is the reference implementation used by the CLI and the tests.
//!
//! Arguments are tokenized on whitespace before matching, so a single
//! argument `"--verbose  3"` behaves like `--verbose 3`. Scanning stops at
//! `--`.

use is_terminal::IsTerminal;
use serde::Serialize;

/// Environment variable that overrides argv-derived verbosity.
pub const SHELL_VERBOSITY: &str = "SHELL_VERBOSITY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
    Debug,
}

impl Verbosity {
    /// Numeric level used by the generated stub (`QUIET` = 0).
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Value of [`SHELL_VERBOSITY`] that selects this level (`QUIET` = -1).
    /// The stub exports it to the runtime after negotiating.
    pub fn shell_verbosity(self) -> i8 {
        self.level() as i8 - 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiet => "QUIET",
            Self::Normal => "NORMAL",
            Self::Verbose => "VERBOSE",
            Self::VeryVerbose => "VERY_VERBOSE",
            Self::Debug => "DEBUG",
        }
    }

    /// Level selected by a `--verbose` value.
    ///
    /// Anything that is not a plain decimal number, and the values 0 and 1,
    /// select `Verbose`.
    pub fn from_verbose_value(value: &str) -> Self {
        match decimal(value) {
            Some(n) if n >= 3 => Self::Debug,
            Some(2) => Self::VeryVerbose,
            _ => Self::Verbose,
        }
    }

    /// Level selected by the shell-verbosity environment value.
    ///
    /// Returns `None` when the value is not an integer.
    pub fn from_shell_verbosity(value: &str) -> Option<Self> {
        let (negative, digits) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let n = decimal(digits)?;
        Some(match (negative, n) {
            (_, 0) => Self::Normal,
            (true, _) => Self::Quiet,
            (false, 1) => Self::Verbose,
            (false, 2) => Self::VeryVerbose,
            (false, _) => Self::Debug,
        })
    }

    fn from_flag_count(count: usize) -> Self {
        match count {
            0 => Self::Normal,
            1 => Self::Verbose,
            2 => Self::VeryVerbose,
            _ => Self::Debug,
        }
    }
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a plain decimal number. Values longer than nine digits saturate.
fn decimal(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if value.len() > 9 {
        return Some(u32::MAX);
    }
    value.parse().ok()
}

/// Snapshot of the process state the negotiation reads.
///
/// Built once at startup and passed explicitly; nothing here reads the
/// environment after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoContext {
    /// Arguments without the program name.
    pub argv: Vec<String>,
    /// Raw value of [`SHELL_VERBOSITY`], if set.
    pub shell_verbosity: Option<String>,
    /// Whether standard input is a terminal.
    pub stdin_tty: bool,
}

impl IoContext {
    pub fn new<I, S>(argv: I, shell_verbosity: Option<&str>, stdin_tty: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            shell_verbosity: shell_verbosity.map(str::to_string),
            stdin_tty,
        }
    }

    /// Capture the current process arguments, environment and terminal.
    pub fn from_env() -> Self {
        Self {
            argv: std::env::args().skip(1).collect(),
            shell_verbosity: std::env::var(SHELL_VERBOSITY).ok(),
            stdin_tty: std::io::stdin().is_terminal(),
        }
    }
}

/// Negotiated interactivity and verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoMode {
    pub interactive: bool,
    pub verbosity: Verbosity,
}

impl IoMode {
    pub fn derive(ctx: &IoContext) -> Self {
        let flags = ArgvFlags::scan(&ctx.argv);

        let argv_verbosity = if flags.quiet {
            Verbosity::Quiet
        } else {
            flags.verbose
        };
        let verbosity = ctx
            .shell_verbosity
            .as_deref()
            .and_then(Verbosity::from_shell_verbosity)
            .unwrap_or(argv_verbosity);

        let interactive =
            ctx.stdin_tty && !flags.no_interaction && !flags.quiet && verbosity != Verbosity::Quiet;

        Self {
            interactive,
            verbosity,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }
}

#[derive(Debug)]
struct ArgvFlags {
    quiet: bool,
    no_interaction: bool,
    verbose: Verbosity,
}

impl ArgvFlags {
    fn scan(argv: &[String]) -> Self {
        let mut flags = Self {
            quiet: false,
            no_interaction: false,
            verbose: Verbosity::Normal,
        };
        let mut tokens = argv.iter().flat_map(|a| a.split_whitespace()).peekable();

        while let Some(token) = tokens.next() {
            let level = match token {
                "--" => break,
                "-q" | "--quiet" => {
                    flags.quiet = true;
                    continue;
                }
                "-n" | "--no-interaction" => {
                    flags.no_interaction = true;
                    continue;
                }
                "--verbose" => match tokens.peek() {
                    Some(next) if decimal(next).is_some() => {
                        let value = Verbosity::from_verbose_value(next);
                        tokens.next();
                        value
                    }
                    _ => Verbosity::Verbose,
                },
                t if t.starts_with("--verbose=") => {
                    Verbosity::from_verbose_value(&t["--verbose=".len()..])
                }
                t if t.len() > 1 && t.starts_with('-') && t[1..].bytes().all(|b| b == b'v') => {
                    Verbosity::from_flag_count(t.len() - 1)
                }
                _ => continue,
            };
            flags.verbose = flags.verbose.max(level);
        }
        flags
    }
}
