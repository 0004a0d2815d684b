//! Permanent per-run artifact layout under the reports root.
//!
//! ```text
//! <root>/<run_id>/monocart/     rich HTML report bundle
//! <root>/<run_id>/coverage/     lcov HTML viewer
//! <root>/<run_id>/results.xml   raw JUnit document
//! <root>/<run_id>/videos/       retained failure videos
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const MONOCART_DIR: &str = "monocart";
pub const COVERAGE_DIR: &str = "coverage";
pub const RESULTS_XML: &str = "results.xml";
pub const VIDEOS_DIR: &str = "videos";

/// URL prefix under which the reports root is served.
pub const REPORTS_URL_PREFIX: &str = "/reports";

const MAX_RUN_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("path escapes the reports root")]
    Forbidden,
    #[error("report file not found")]
    NotFound,
}

#[derive(Debug, Clone)]
pub struct ReportLayout {
    root: PathBuf,
}

impl ReportLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    pub fn monocart_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(MONOCART_DIR)
    }

    pub fn coverage_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(COVERAGE_DIR)
    }

    pub fn results_xml(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(RESULTS_XML)
    }

    pub fn videos_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(VIDEOS_DIR)
    }

    /// Public URL of a retained video file.
    pub fn video_url(run_id: &str, file_name: &str) -> String {
        format!("{REPORTS_URL_PREFIX}/{run_id}/{VIDEOS_DIR}/{file_name}")
    }

    /// Empty run directory, discarding whatever a previous upload left behind.
    pub fn prepare_run_dir(&self, run_id: &str) -> io::Result<PathBuf> {
        self.remove_run_dir(run_id)?;
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Returns whether a directory was present.
    pub fn remove_run_dir(&self, run_id: &str) -> io::Result<bool> {
        match fs::remove_dir_all(self.run_dir(run_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Map a request path (relative to the reports root) to a file on disk.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, ResolveError> {
        let mut joined = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => joined.push(part),
                Component::CurDir => {}
                _ => return Err(ResolveError::Forbidden),
            }
        }

        let root = self.root.canonicalize().map_err(|_| ResolveError::NotFound)?;
        let resolved = joined.canonicalize().map_err(|_| ResolveError::NotFound)?;
        if !resolved.starts_with(&root) {
            return Err(ResolveError::Forbidden);
        }
        if !resolved.is_file() {
            return Err(ResolveError::NotFound);
        }
        Ok(resolved)
    }
}

/// Run ids become directory names, so only a conservative character set is allowed.
pub fn is_valid_run_id(run_id: &str) -> bool {
    !run_id.is_empty()
        && run_id.len() <= MAX_RUN_ID_LEN
        && run_id != "."
        && run_id != ".."
        && run_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("webm") => "video/webm",
        Some("mp4") => "video/mp4",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Copy a directory tree. Symlinks in the source are not followed. Returns bytes copied.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<u64> {
    fs::create_dir_all(dest)?;
    let mut total = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ft = entry.file_type()?;
        let target = dest.join(entry.file_name());
        if ft.is_dir() {
            total += copy_dir_recursive(&entry.path(), &target)?;
        } else if ft.is_file() {
            total += fs::copy(entry.path(), &target)?;
        }
    }
    Ok(total)
}
