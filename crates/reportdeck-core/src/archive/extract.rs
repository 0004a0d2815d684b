//! Upload archive unpacking.
//!
//! Accepts gzip-compressed or plain tar streams. Every entry path is checked
//! before anything touches the filesystem: only normal relative components are
//! allowed, and only regular files and directories are written. Links, device
//! nodes and traversal attempts are skipped and reported in the summary.

use super::limits::{ArchiveLimits, LimitReader};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::EntryType;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive io error: {0}")]
    Io(#[from] io::Error),

    #[error("archive limit exceeded: {0}")]
    Limit(String),

    #[error("unreadable archive entry #{index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    fn classify(err: io::Error, index: Option<usize>) -> Self {
        let msg = err.to_string();
        if msg.contains("LimitArchiveBytes") || msg.contains("LimitDecodedBytes") {
            return ArchiveError::Limit(msg);
        }
        match index {
            Some(index) => ArchiveError::Entry { index, source: err },
            None => ArchiveError::Io(err),
        }
    }
}

/// Why an entry was left out of the extracted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnsafePath,
    Link,
    SpecialFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub dirs: usize,
    pub bytes_written: u64,
    pub skipped: Vec<SkippedEntry>,
}

/// Unpack the archive stored at `archive_path` into `dest`, which must exist.
pub fn extract_archive(
    archive_path: &Path,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<ExtractSummary, ArchiveError> {
    let file = File::open(archive_path)?;
    extract_from_reader(file, dest, limits)
}

pub fn extract_from_reader<R: Read>(
    reader: R,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<ExtractSummary, ArchiveError> {
    let reader = LimitReader::new(reader, limits.max_archive_bytes, "LimitArchiveBytes");
    let mut reader = BufReader::new(reader);

    let is_gzip = reader
        .fill_buf()
        .map_err(|e| ArchiveError::classify(e, None))?
        .starts_with(&GZIP_MAGIC);

    let decoded: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };
    let decoded = LimitReader::new(decoded, limits.max_decoded_bytes, "LimitDecodedBytes");

    let mut archive = tar::Archive::new(decoded);
    let mut summary = ExtractSummary::default();

    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::classify(e, None))?;

    for (i, entry) in entries.enumerate() {
        if i >= limits.max_entries {
            return Err(ArchiveError::Limit(format!(
                "archive has more than {} entries",
                limits.max_entries
            )));
        }

        let mut entry = entry.map_err(|e| ArchiveError::classify(e, Some(i)))?;
        let raw_path = entry
            .path()
            .map_err(|e| ArchiveError::classify(e, Some(i)))?
            .into_owned();
        let entry_name = raw_path.to_string_lossy().into_owned();

        if entry_name.len() > limits.max_path_len {
            return Err(ArchiveError::Limit(format!(
                "path length {} exceeds limit {}",
                entry_name.len(),
                limits.max_path_len
            )));
        }

        let kind = entry.header().entry_type();
        let relative = match sanitize_entry_path(&raw_path) {
            // `tar -C dir .` starts with a `./` directory entry.
            Some(root) if root.as_os_str().is_empty() => {
                if kind == EntryType::Directory {
                    continue;
                }
                None
            }
            other => other,
        };
        let Some(relative) = relative else {
            tracing::warn!(entry = %entry_name, "skipping archive entry with unsafe path");
            summary.skipped.push(SkippedEntry {
                path: entry_name,
                reason: SkipReason::UnsafePath,
            });
            continue;
        };
        let target = dest.join(&relative);

        match kind {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                summary.dirs += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                let written = io::copy(&mut entry, &mut out)
                    .map_err(|e| ArchiveError::classify(e, Some(i)))?;
                summary.files += 1;
                summary.bytes_written += written;
            }
            EntryType::Symlink | EntryType::Link => {
                tracing::warn!(entry = %entry_name, "skipping link entry in archive");
                summary.skipped.push(SkippedEntry {
                    path: entry_name,
                    reason: SkipReason::Link,
                });
            }
            EntryType::XGlobalHeader | EntryType::XHeader => {}
            other => {
                tracing::debug!(entry = %entry_name, kind = ?other, "skipping special archive entry");
                summary.skipped.push(SkippedEntry {
                    path: entry_name,
                    reason: SkipReason::SpecialFile,
                });
            }
        }
    }

    Ok(summary)
}

/// Relative path made only of normal components, or `None` if the entry would
/// resolve outside the extraction root. The archive root itself (`./`) yields
/// an empty path.
fn sanitize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}
