//! Archive assembly.
//!
//! Byte-for-byte reproducible: members are sorted by logical path, tar
//! headers carry no timestamps or owners, gzip headers have mtime 0, and
//! compaction results are merged by index regardless of worker scheduling.

use super::format::header_line;
use super::reader::member_digest;
use super::signature::{key_id, SignatureBlock};
use super::Compression;
use crate::compactor::CompactorChain;
use crate::entry::{normalize_logical_path, SourceEntry};
use crate::error::{BuildError, BuildResult};
use crate::stub::BootstrapStub;
use ed25519_dalek::SigningKey;
use flate2::{Compression as GzLevel, GzBuilder};
use serde::Serialize;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tar::{Builder, EntryType, Header};

const ZSTD_LEVEL: i32 = 19;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub compression: Compression,
    pub signing_key: Option<SigningKey>,
    /// Comment inserted after the stub's shebang.
    pub banner: Option<String>,
    /// Compaction threads; 0 uses the available parallelism.
    pub workers: usize,
    /// Checked between per-file compaction steps.
    pub cancel: Option<Arc<AtomicBool>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildSummary {
    pub output: PathBuf,
    pub members: usize,
    pub bytes: u64,
    pub compression: Compression,
    pub signed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// `sha256:<hex>` of the whole archive file.
    pub sha256: String,
}

pub struct ArchiveBuilder {
    chain: CompactorChain,
    options: BuildOptions,
}

impl ArchiveBuilder {
    pub fn new(chain: CompactorChain, options: BuildOptions) -> Self {
        Self { chain, options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Assemble the archive in memory.
    ///
    /// Fails with `DuplicateMember` before reading any source, with
    /// `SourceUnavailable` when an entry cannot be read, and with
    /// `Cancelled` when the cancel flag is raised during compaction.
    pub fn build(&self, entries: &[SourceEntry], stub: &BootstrapStub) -> BuildResult<Vec<u8>> {
        let members = sorted_members(entries)?;
        let contents = self.compact_all(&members)?;

        let table = write_member_table(&members, &contents)?;
        let payload = compress(self.options.compression, &table)?;

        let mut archive = stub.render(self.options.banner.as_deref());
        archive.extend_from_slice(header_line(self.options.compression, payload.len()).as_bytes());
        archive.extend_from_slice(&payload);

        if let Some(key) = &self.options.signing_key {
            let block = SignatureBlock::sign(&archive, key);
            archive.extend_from_slice(&block.to_bytes());
        }

        tracing::info!(
            members = members.len(),
            table_bytes = table.len(),
            archive_bytes = archive.len(),
            compression = %self.options.compression,
            signed = self.options.signing_key.is_some(),
            "archive assembled"
        );
        Ok(archive)
    }

    /// Build and atomically write the archive to `output`.
    ///
    /// The archive is written to a temporary file next to `output` and
    /// renamed into place, so a failed build never replaces an existing
    /// file.
    pub fn build_to_path(
        &self,
        entries: &[SourceEntry],
        stub: &BootstrapStub,
        output: &Path,
    ) -> BuildResult<BuildSummary> {
        let bytes = self.build(entries, stub)?;
        let display = output.display().to_string();

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| BuildError::io(&display, e))?;
        temp.write_all(&bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| BuildError::io(&display, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o755))
                .map_err(|e| BuildError::io(&display, e))?;
        }

        temp.persist(output)
            .map_err(|e| BuildError::io(&display, e.error))?;

        let key_id = match &self.options.signing_key {
            Some(key) => key_id(&key.verifying_key()).ok(),
            None => None,
        };
        Ok(BuildSummary {
            output: output.to_path_buf(),
            members: entries.len(),
            bytes: bytes.len() as u64,
            compression: self.options.compression,
            signed: self.options.signing_key.is_some(),
            key_id,
            sha256: member_digest(&bytes),
        })
    }

    fn is_cancelled(&self) -> bool {
        self.options
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn worker_count(&self, jobs: usize) -> usize {
        let wanted = match self.options.workers {
            0 => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        };
        wanted.clamp(1, jobs.max(1))
    }

    fn compact_one(&self, path: &str, entry: &SourceEntry) -> BuildResult<Vec<u8>> {
        if self.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let raw = entry.read()?;
        let out = self.chain.apply(entry.kind(), &raw, path);
        tracing::debug!(path, kind = ?entry.kind(), before = raw.len(), after = out.len(), "member compacted");
        Ok(out)
    }

    /// Compact every member, preserving input order in the result.
    fn compact_all(&self, members: &[(String, &SourceEntry)]) -> BuildResult<Vec<Vec<u8>>> {
        let workers = self.worker_count(members.len());
        if workers == 1 {
            return members
                .iter()
                .map(|(path, entry)| self.compact_one(path, entry))
                .collect();
        }

        let chunk = members.len().div_ceil(workers);
        let parts: Vec<Vec<BuildResult<Vec<u8>>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = members
                .chunks(chunk)
                .map(|part| {
                    scope.spawn(move || {
                        let mut done = Vec::with_capacity(part.len());
                        for (path, entry) in part {
                            let result = self.compact_one(path, entry);
                            let failed = result.is_err();
                            done.push(result);
                            if failed {
                                break;
                            }
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        // First error in member order wins.
        parts.into_iter().flatten().collect()
    }
}

/// Normalize, sort and de-duplicate entries by logical path.
fn sorted_members(entries: &[SourceEntry]) -> BuildResult<Vec<(String, &SourceEntry)>> {
    let mut members = entries
        .iter()
        .map(|e| Ok((normalize_logical_path(e.logical_path())?, e)))
        .collect::<BuildResult<Vec<_>>>()?;
    members.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some(pair) = members.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(BuildError::DuplicateMember {
            path: pair[0].0.clone(),
        });
    }
    Ok(members)
}

fn write_member_table(members: &[(String, &SourceEntry)], contents: &[Vec<u8>]) -> BuildResult<Vec<u8>> {
    let mut tar = Builder::new(Vec::new());
    tar.mode(tar::HeaderMode::Deterministic);
    for ((path, _), data) in members.iter().zip(contents) {
        write_entry(&mut tar, path, data).map_err(|e| BuildError::io(path.as_str(), e))?;
    }
    tar.into_inner()
        .map_err(|e| BuildError::io("member table", e))
}

fn write_entry(tar: &mut Builder<Vec<u8>>, path: &str, data: &[u8]) -> std::io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    tar.append_data(&mut header, path, data)
}

fn compress(compression: Compression, table: &[u8]) -> BuildResult<Vec<u8>> {
    let io = |e: std::io::Error| BuildError::io("payload", e);
    match compression {
        Compression::None => Ok(table.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzBuilder::new()
                .mtime(0)
                .operating_system(255)
                .write(Vec::new(), GzLevel::best());
            encoder.write_all(table).map_err(io)?;
            encoder.finish().map_err(io)
        }
        Compression::Zstd => zstd::stream::encode_all(table, ZSTD_LEVEL).map_err(io),
    }
}
