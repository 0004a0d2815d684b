pub mod extract;
pub mod limits;
pub mod locate;

pub use extract::{
    extract_archive, extract_from_reader, ArchiveError, ExtractSummary, SkipReason, SkippedEntry,
};
pub use limits::{ArchiveLimits, ArchiveLimitsOverrides};
pub use locate::{find_dirs, find_files, find_files_any, DirMatch, FileMatch};
