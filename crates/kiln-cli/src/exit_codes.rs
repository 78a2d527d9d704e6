//! Process exit codes. These are part of the public CLI contract.

use kiln_core::ErrorKind;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1; // Build failed, or `diff` found differences
pub const CONFIG_ERROR: i32 = 2; // Invalid configuration, option or usage
pub const VERIFY_FAILED: i32 = 3; // Signature invalid or untrusted

/// Exit code for a library failure of `kind`.
pub fn for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Config | ErrorKind::UnsupportedOption | ErrorKind::InvalidMemberPath => {
            CONFIG_ERROR
        }
        ErrorKind::SignatureMismatch => VERIFY_FAILED,
        ErrorKind::SourceUnavailable
        | ErrorKind::DuplicateMember
        | ErrorKind::UnsatisfiableRequirement
        | ErrorKind::MalformedArchive
        | ErrorKind::Io
        | ErrorKind::Cancelled => FAILURE,
    }
}
