//! The persistent archive.
//!
//! - `archiver`: the merge-and-swap commit procedure
//! - `entry`: entry naming and per-file metadata

pub mod archiver;
pub mod entry;

pub use archiver::{
    read_archive, ArchiveEntry, ArchiveError, Archiver, DEFAULT_ARCHIVE_NAME, STAGING_PREFIX,
};
pub use entry::{absolute_root, entry_name};
