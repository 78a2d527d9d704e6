//! Read-only view of a finished archive.
//!
//! The whole file is loaded into memory and the member table is decoded once
//! on open. Archives are immutable; every consumer opens its own view.

use super::format::{parse_layout, Layout};
use super::Compression;
use crate::error::ArchiveError;
use crate::stub::{self, StubInfo};
use flate2::read::GzDecoder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path};

/// Upper bound on the decoded member table.
pub const MAX_DECODED_BYTES: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub path: String,
    pub size: u64,
    /// `sha256:<hex>` of the stored (compacted) content.
    pub sha256: String,
}

pub struct Archive {
    bytes: Vec<u8>,
    layout: Layout,
    members: BTreeMap<String, Vec<u8>>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("len", &self.bytes.len())
            .field("layout", &self.layout)
            .field("members", &self.members.len())
            .finish()
    }
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        let layout = parse_layout(&bytes)?;
        let table = decompress(layout.compression, &bytes[layout.payload.clone()])?;
        let members = read_member_table(&table)?;
        tracing::debug!(
            members = members.len(),
            compression = %layout.compression,
            signed = layout.has_trailer(),
            "archive opened"
        );
        Ok(Self {
            bytes,
            layout,
            members,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn compression(&self) -> Compression {
        self.layout.compression
    }

    pub fn stub_bytes(&self) -> &[u8] {
        &self.bytes[self.layout.stub.clone()]
    }

    /// Entry point and requirements embedded in the stub.
    pub fn stub_info(&self) -> Result<StubInfo, ArchiveError> {
        stub::inspect(self.stub_bytes())
    }

    /// True when bytes follow the payload (a signature region, valid or not).
    pub fn has_signature_region(&self) -> bool {
        self.layout.has_trailer()
    }

    pub fn signature_region(&self) -> &[u8] {
        &self.bytes[self.layout.trailer.clone()]
    }

    /// Bytes covered by the signature digest.
    pub fn signed_content(&self) -> &[u8] {
        &self.bytes[self.layout.signed_content()]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_paths(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn read_member(&self, path: &str) -> Option<&[u8]> {
        self.members.get(path).map(Vec::as_slice)
    }

    /// Members sorted by path.
    pub fn members(&self) -> Vec<MemberInfo> {
        self.members
            .iter()
            .map(|(path, content)| MemberInfo {
                path: path.clone(),
                size: content.len() as u64,
                sha256: member_digest(content),
            })
            .collect()
    }
}

pub(crate) fn member_digest(content: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(content)))
}

fn decompress(compression: Compression, payload: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let reader: Box<dyn Read + '_> = match compression {
        Compression::None => return Ok(payload.to_vec()),
        Compression::Gzip => Box::new(GzDecoder::new(payload)),
        Compression::Zstd => Box::new(
            zstd::stream::read::Decoder::new(payload)
                .map_err(|e| ArchiveError::malformed(format!("zstd payload: {e}")))?,
        ),
    };
    let mut out = Vec::new();
    reader
        .take(MAX_DECODED_BYTES + 1)
        .read_to_end(&mut out)
        .map_err(|e| ArchiveError::malformed(format!("{compression} payload: {e}")))?;
    if out.len() as u64 > MAX_DECODED_BYTES {
        return Err(ArchiveError::malformed(format!(
            "decoded member table exceeds {MAX_DECODED_BYTES} bytes"
        )));
    }
    Ok(out)
}

fn read_member_table(table: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let mut archive = tar::Archive::new(Cursor::new(table));
    let mut members = BTreeMap::new();
    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::malformed(format!("member table: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::malformed(format!("member table: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| ArchiveError::malformed(format!("member path: {e}")))?
            .into_owned();
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ArchiveError::malformed(format!(
                "member path escapes archive root: {}",
                path.display()
            )));
        }
        let name = path.to_string_lossy().replace('\\', "/");

        // The declared size is untrusted: read no more than the table holds.
        let declared = entry.size();
        let mut content = Vec::new();
        (&mut entry)
            .take(table.len() as u64)
            .read_to_end(&mut content)
            .map_err(|e| ArchiveError::malformed(format!("member {name}: {e}")))?;
        if content.len() as u64 != declared {
            return Err(ArchiveError::malformed(format!(
                "member {name} truncated: header declares {declared} bytes, table holds {}",
                content.len()
            )));
        }
        if members.insert(name.clone(), content).is_some() {
            return Err(ArchiveError::malformed(format!("duplicate member {name}")));
        }
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::format::header_line;

    fn raw_archive(table: &[u8]) -> Vec<u8> {
        let mut bytes = b"#!/bin/sh\n__KILN_HALT__\n".to_vec();
        bytes.extend_from_slice(header_line(Compression::None, table.len()).as_bytes());
        bytes.extend_from_slice(table);
        bytes
    }

    fn tar_with(paths: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in paths {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn reads_members_sorted() {
        let table = tar_with(&[("src/b.php", b"b"), ("a.txt", b"aa")]);
        let archive = Archive::from_bytes(raw_archive(&table)).unwrap();
        let paths: Vec<_> = archive.member_paths().collect();
        assert_eq!(paths, vec!["a.txt", "src/b.php"]);
        assert_eq!(archive.read_member("a.txt"), Some(&b"aa"[..]));
        assert_eq!(archive.members()[0].size, 2);
        assert!(archive.members()[0].sha256.starts_with("sha256:"));
        assert!(!archive.has_signature_region());
    }

    #[test]
    fn duplicate_members_are_malformed() {
        let table = tar_with(&[("a.txt", b"1"), ("a.txt", b"2")]);
        let err = Archive::from_bytes(raw_archive(&table)).unwrap_err();
        assert!(err.to_string().contains("duplicate member a.txt"), "{err}");
    }

    #[test]
    fn oversized_member_header_is_malformed() {
        let mut header = tar::Header::new_gnu();
        header.set_path("huge.bin").unwrap();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(1 << 62);
        header.set_cksum();

        let mut table = header.as_bytes().to_vec();
        let mut block = vec![0u8; 512];
        block[..4].copy_from_slice(b"data");
        table.extend_from_slice(&block);
        table.extend_from_slice(&[0u8; 1024]);

        let err = Archive::from_bytes(raw_archive(&table)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedArchive);
        assert!(err.to_string().contains("huge.bin truncated"), "{err}");
    }

    #[test]
    fn corrupt_compressed_payload_is_malformed() {
        let mut bytes = b"#!/bin/sh\n__KILN_HALT__\n".to_vec();
        bytes.extend_from_slice(header_line(Compression::Gzip, 4).as_bytes());
        bytes.extend_from_slice(b"nope");
        let err = Archive::from_bytes(bytes).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedArchive);
    }
}
