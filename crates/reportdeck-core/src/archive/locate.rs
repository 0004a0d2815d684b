//! Recursive artifact search over an extracted upload.
//!
//! Matching is case-sensitive and applies to the final path component only.
//! Results are sorted so "first match" is the lexicographically smallest path,
//! which also puts a parent directory ahead of anything nested inside it.
//! Symbolic links are never followed.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMatch<'a> {
    /// File name equals the pattern.
    Exact(&'a str),
    /// File name ends with the pattern, e.g. `.webm`.
    Suffix(&'a str),
}

impl FileMatch<'_> {
    fn matches(&self, name: &str) -> bool {
        match self {
            FileMatch::Exact(p) => name == *p,
            FileMatch::Suffix(p) => name.ends_with(p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirMatch<'a> {
    Exact(&'a str),
    Contains(&'a str),
}

impl DirMatch<'_> {
    fn matches(&self, name: &str) -> bool {
        match self {
            DirMatch::Exact(p) => name == *p,
            DirMatch::Contains(p) => name.contains(p),
        }
    }
}

/// All regular files under `root` whose name matches. A missing root yields nothing.
pub fn find_files(root: &Path, pattern: FileMatch<'_>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(root, &mut |path, is_dir| {
        if !is_dir && file_name(path).is_some_and(|n| pattern.matches(n)) {
            out.push(path.to_path_buf());
        }
    });
    out.sort();
    out
}

/// Files matching any of `patterns`, merged and sorted.
pub fn find_files_any(root: &Path, patterns: &[FileMatch<'_>]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(root, &mut |path, is_dir| {
        if !is_dir && file_name(path).is_some_and(|n| patterns.iter().any(|p| p.matches(n))) {
            out.push(path.to_path_buf());
        }
    });
    out.sort();
    out
}

/// All directories under `root` (excluding `root` itself) whose name matches.
pub fn find_dirs(root: &Path, pattern: DirMatch<'_>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(root, &mut |path, is_dir| {
        if is_dir && file_name(path).is_some_and(|n| pattern.matches(n)) {
            out.push(path.to_path_buf());
        }
    });
    out.sort();
    out
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|s| s.to_str())
}

fn walk(dir: &Path, visit: &mut dyn FnMut(&Path, bool)) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(ft) = entry.file_type() else {
            continue;
        };
        if ft.is_dir() {
            visit(&path, true);
            walk(&path, visit);
        } else if ft.is_file() {
            visit(&path, false);
        }
    }
}
