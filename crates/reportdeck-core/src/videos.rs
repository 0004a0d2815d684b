//! Failure-video retention.
//!
//! Playwright writes one directory per test under `test-results/`, named after a
//! truncated and sanitised version of the test title. Names are compared after
//! lower-casing and turning whitespace runs into `-`, and a video is kept when
//! its directory name and a failed test name contain one another.

use crate::archive::{find_files_any, FileMatch};
use crate::reports::ReportLayout;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

pub const VIDEO_PATTERNS: [FileMatch<'static>; 2] =
    [FileMatch::Suffix(".webm"), FileMatch::Suffix(".mp4")];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

pub fn normalize_test_name(name: &str) -> String {
    WHITESPACE.replace_all(&name.to_lowercase(), "-").into_owned()
}

/// Set of normalised failed-test names. Empty means "no signal": keep every video.
#[derive(Debug, Clone, Default)]
pub struct FailedTests {
    names: BTreeSet<String>,
}

impl FailedTests {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            names: names
                .into_iter()
                .map(normalize_test_name)
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether a video living in directory `dir_name` should be retained.
    pub fn retains(&self, dir_name: &str) -> bool {
        if self.names.is_empty() {
            return true;
        }
        let dir = normalize_test_name(dir_name);
        if dir.is_empty() {
            return false;
        }
        self.names
            .iter()
            .any(|name| dir.contains(name.as_str()) || name.contains(dir.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoSelection {
    pub candidates: usize,
    pub retained: Vec<String>,
}

impl VideoSelection {
    pub fn any_retained(&self) -> bool {
        !self.retained.is_empty()
    }
}

/// Copy videos found under `test_results_dir` that belong to a failed test into
/// `videos_dir` as `<test-dir>-<file>`. The destination is created lazily.
pub fn retain_videos(
    test_results_dir: &Path,
    videos_dir: &Path,
    failed: &FailedTests,
) -> io::Result<VideoSelection> {
    let candidates = find_files_any(test_results_dir, &VIDEO_PATTERNS);
    let mut selection = VideoSelection {
        candidates: candidates.len(),
        retained: Vec::new(),
    };

    for video in candidates {
        let dir_name = video
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let Some(file_name) = video.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !failed.retains(dir_name) {
            continue;
        }

        let dest_name = format!("{dir_name}-{file_name}");
        // Same flattened name at another depth: the first candidate wins.
        if selection.retained.contains(&dest_name) {
            tracing::debug!(video = %video.display(), "duplicate video name skipped");
            continue;
        }
        fs::create_dir_all(videos_dir)?;
        fs::copy(&video, videos_dir.join(&dest_name))?;
        selection.retained.push(dest_name);
    }

    Ok(selection)
}

/// URL of the retained video for `test_name`, if any. The file list is sorted
/// and the first case-insensitive match on the normalised name wins.
pub fn find_video_for_test(videos_dir: &Path, run_id: &str, test_name: &str) -> Option<String> {
    let entries = fs::read_dir(videos_dir).ok()?;
    let mut files: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    files.sort();

    let needle = normalize_test_name(test_name);
    if needle.is_empty() {
        return None;
    }
    files
        .into_iter()
        .find(|f| f.to_lowercase().contains(&needle))
        .map(|f| ReportLayout::video_url(run_id, &f))
}
