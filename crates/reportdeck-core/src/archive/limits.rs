//! Resource limits and bounded readers for upload extraction.

use serde::Deserialize;
use std::io::Read;

/// Resource limits applied while unpacking an uploaded archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_archive_bytes: u64,
    pub max_decoded_bytes: u64,
    pub max_entries: usize,
    pub max_path_len: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 512 * 1024 * 1024,     // 512 MB compressed
            max_decoded_bytes: 4 * 1024 * 1024 * 1024, // 4 GB unpacked
            max_entries: 200_000,
            max_path_len: 1024,
        }
    }
}

/// Partial overrides for `ArchiveLimits`. Only `Some` values override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveLimitsOverrides {
    pub max_archive_bytes: Option<u64>,
    pub max_decoded_bytes: Option<u64>,
    pub max_entries: Option<usize>,
    pub max_path_len: Option<usize>,
}

impl ArchiveLimits {
    pub fn apply(self, overrides: ArchiveLimitsOverrides) -> Self {
        Self {
            max_archive_bytes: overrides
                .max_archive_bytes
                .unwrap_or(self.max_archive_bytes),
            max_decoded_bytes: overrides
                .max_decoded_bytes
                .unwrap_or(self.max_decoded_bytes),
            max_entries: overrides.max_entries.unwrap_or(self.max_entries),
            max_path_len: overrides.max_path_len.unwrap_or(self.max_path_len),
        }
    }
}

/// A reader that limits the total number of bytes read and fails explicitly on overflow.
pub(crate) struct LimitReader<R> {
    inner: R,
    limit: u64,
    read: u64,
    error_tag: &'static str,
}

impl<R: Read> LimitReader<R> {
    pub(crate) fn new(inner: R, limit: u64, error_tag: &'static str) -> Self {
        Self {
            inner,
            limit,
            read: 0,
            error_tag,
        }
    }
}

impl<R: Read> Read for LimitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.read >= self.limit {
            // Only an error if the stream actually has more to give.
            let mut probe = [0u8; 1];
            return match self.inner.read(&mut probe)? {
                0 => Ok(0),
                _ => Err(std::io::Error::other(format!(
                    "{}: exceeded limit of {} bytes",
                    self.error_tag, self.limit
                ))),
            };
        }

        let max_to_read = (self.limit - self.read).min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max_to_read])?;
        self.read += n as u64;

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn overrides_apply_selectively() {
        let limits = ArchiveLimits::default().apply(ArchiveLimitsOverrides {
            max_entries: Some(10),
            ..Default::default()
        });
        assert_eq!(limits.max_entries, 10);
        assert_eq!(
            limits.max_archive_bytes,
            ArchiveLimits::default().max_archive_bytes
        );
    }

    #[test]
    fn limit_reader_allows_exact_size() {
        let mut r = LimitReader::new(Cursor::new(vec![7u8; 8]), 8, "LimitTest");
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn limit_reader_rejects_overflow() {
        let mut r = LimitReader::new(Cursor::new(vec![7u8; 9]), 8, "LimitTest");
        let mut out = Vec::new();
        let err = r.read_to_end(&mut out).unwrap_err();
        assert!(err.to_string().contains("LimitTest"));
    }
}
