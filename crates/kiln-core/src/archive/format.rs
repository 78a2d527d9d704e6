//! Region layout of a finished archive.

use super::Compression;
use crate::error::ArchiveError;
use std::ops::Range;

/// Version tag of the payload header line.
pub const FORMAT_TAG: &str = "KILN/1";

/// Bytes that end the stub region (the halt marker on its own line).
pub const STUB_TERMINATOR: &[u8] = b"\n__KILN_HALT__\n";

const MAX_HEADER_LEN: usize = 64;

/// `KILN/1 <compression> <payload-length>\n`
pub fn header_line(compression: Compression, payload_len: usize) -> String {
    format!("{FORMAT_TAG} {compression} {payload_len}\n")
}

/// Byte ranges of the regions of one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Stub bytes including the terminator.
    pub stub: Range<usize>,
    pub compression: Compression,
    pub payload: Range<usize>,
    /// Bytes after the payload; non-empty when a signature region is present.
    pub trailer: Range<usize>,
}

impl Layout {
    /// Bytes covered by the content digest.
    pub fn signed_content(&self) -> Range<usize> {
        0..self.payload.end
    }

    pub fn has_trailer(&self) -> bool {
        !self.trailer.is_empty()
    }
}

/// Locate the regions of `bytes`.
pub fn parse_layout(bytes: &[u8]) -> Result<Layout, ArchiveError> {
    let terminator = find(bytes, STUB_TERMINATOR)
        .ok_or_else(|| ArchiveError::malformed("stub terminator not found"))?;
    let header_start = terminator + STUB_TERMINATOR.len();

    let window = &bytes[header_start..bytes.len().min(header_start + MAX_HEADER_LEN)];
    let header_len = window
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| ArchiveError::malformed("payload header line not found"))?;
    let header = std::str::from_utf8(&window[..header_len])
        .map_err(|_| ArchiveError::malformed("payload header is not UTF-8"))?;

    let mut fields = header.split(' ');
    if fields.next() != Some(FORMAT_TAG) {
        return Err(ArchiveError::malformed(format!(
            "unsupported payload header '{header}'"
        )));
    }
    let compression = fields
        .next()
        .ok_or_else(|| ArchiveError::malformed("payload header lacks compression"))?
        .parse::<Compression>()
        .map_err(|e| ArchiveError::malformed(e.to_string()))?;
    let payload_len: usize = fields
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| ArchiveError::malformed("payload header lacks a valid length"))?;
    if fields.next().is_some() {
        return Err(ArchiveError::malformed("trailing fields in payload header"));
    }

    let payload_start = header_start + header_len + 1;
    let payload_end = payload_start
        .checked_add(payload_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            ArchiveError::malformed(format!(
                "payload of {payload_len} bytes exceeds archive size {}",
                bytes.len()
            ))
        })?;

    Ok(Layout {
        stub: 0..header_start,
        compression,
        payload: payload_start..payload_end,
        trailer: payload_end..bytes.len(),
    })
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
