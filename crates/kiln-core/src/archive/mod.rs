//! Archive container: assembly, reading, comparison and verification.
//!
//! ```text
//! [stub ... "\n__KILN_HALT__\n"]
//! ["KILN/1 <compression> <payload-length>\n"]
//! [payload: member table (tar), compressed as one unit]
//! [signature region (optional)]
//! ```

pub mod builder;
pub mod diff;
pub mod format;
pub mod reader;
pub mod signature;
pub mod verify;

pub use builder::{ArchiveBuilder, BuildOptions, BuildSummary};
pub use diff::{diff, ChangedMember, DiffReport};
pub use reader::{Archive, MemberInfo};
pub use signature::{SignatureAlgorithm, SignatureBlock};
pub use verify::{verify, verify_with_key, VerificationResult};

use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compression applied to the member table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub const ALL: [Compression; 3] = [Self::None, Self::Gzip, Self::Zstd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = BuildError;

    fn from_str(s: &str) -> BuildResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "gzip" | "gz" => Ok(Self::Gzip),
            "zstd" | "zst" => Ok(Self::Zstd),
            _ => Err(BuildError::unsupported("compression", s)),
        }
    }
}
