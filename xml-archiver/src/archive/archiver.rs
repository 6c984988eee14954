//! Incremental archive rewrite.
//!
//! Each commit moves the current archive aside to a staging name, writes a
//! fresh archive containing every staged entry followed by the new file, and
//! then discards the staging copy. If the process dies mid-rewrite, the
//! staging file is the previous archive and can be recovered by hand.

use super::entry::{entry_name, entry_options};
use crate::delivery::Committer;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::{ZipArchive, ZipWriter};

/// Default archive location, relative to the working directory.
pub const DEFAULT_ARCHIVE_NAME: &str = "xml_archive.zip";

/// Prefix that turns the archive's file name into its staging name.
pub const STAGING_PREFIX: char = '_';

/// Errors that can occur while committing a file to the archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive path {} has no file name", .0.display())]
    InvalidArchivePath(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    ReadSource { path: PathBuf, source: io::Error },

    #[error("Failed to create archive {}: {source}", .path.display())]
    CreateArchive { path: PathBuf, source: io::Error },

    #[error("Failed to open archive {}: {source}", .path.display())]
    OpenArchive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("Failed to add {name} to archive: {source}")]
    StartEntry {
        name: String,
        source: zip::result::ZipError,
    },

    #[error("Failed to write {name} into archive: {source}")]
    WriteEntry { name: String, source: io::Error },
}

/// One entry read back from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name, with `/` separators.
    pub name: String,
    /// Uncompressed content.
    pub content: Vec<u8>,
}

/// Owns the archive file and folds settled files into it.
#[derive(Debug, Clone)]
pub struct Archiver {
    archive_path: PathBuf,
    staging_path: PathBuf,
    /// Directory entry names are made relative to.
    entry_root: Option<PathBuf>,
}

impl Archiver {
    /// Creates an archiver for the archive at `archive_path`.
    ///
    /// The staging file lives next to it, named with a `_` prefix.
    pub fn new(archive_path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let archive_path = archive_path.into();
        let file_name = archive_path
            .file_name()
            .ok_or_else(|| ArchiveError::InvalidArchivePath(archive_path.clone()))?;

        let mut staging_name = STAGING_PREFIX.to_string();
        staging_name.push_str(&file_name.to_string_lossy());
        let staging_path = archive_path.with_file_name(staging_name);

        Ok(Self {
            archive_path,
            staging_path,
            entry_root: None,
        })
    }

    /// Name entries relative to `root` instead of by their raw path.
    pub fn with_entry_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.entry_root = Some(root.into());
        self
    }

    /// Path of the live archive.
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Path the previous archive is moved to during a commit.
    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Rewrite the archive so it ends with the current contents of `file_path`.
    ///
    /// Every entry of the previous archive is copied first, in order and
    /// without recompression. Only the outcome of appending `file_path` is
    /// returned; trouble with the previous archive is logged and tolerated.
    pub fn commit(&self, file_path: &Path) -> Result<(), ArchiveError> {
        self.discard_stale_staging();
        let has_previous = self.stage_previous();

        let target = match File::create(&self.archive_path) {
            Ok(file) => file,
            Err(source) => {
                if has_previous {
                    self.restore_previous();
                }
                return Err(ArchiveError::CreateArchive {
                    path: self.archive_path.clone(),
                    source,
                });
            }
        };

        let mut writer = ZipWriter::new(target);
        if has_previous {
            self.copy_previous_entries(&mut writer);
        }

        let appended = self.append_file(&mut writer, file_path);

        match writer.finish() {
            Ok(_) => {
                if has_previous {
                    if let Err(e) = fs::remove_file(&self.staging_path) {
                        tracing::warn!(
                            "Failed to remove staging archive {}: {}",
                            self.staging_path.display(),
                            e
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!("{}", self.finalize_failure_message(has_previous, &e));
            }
        }

        match &appended {
            Ok(name) => tracing::info!("Zipped file: {}", name),
            Err(e) => tracing::warn!("{}", e),
        }
        appended.map(|_| ())
    }

    /// Read every entry of the archive, in order, duplicates included.
    pub fn read_entries(&self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        read_archive(&self.archive_path)
    }

    /// Log line for a failed finalize, naming the intact copy if there is one.
    ///
    /// The next commit deletes the staging file, so this is the only notice
    /// an operator gets before that copy is gone.
    fn finalize_failure_message(&self, has_previous: bool, error: &dyn std::fmt::Display) -> String {
        if has_previous {
            format!(
                "Failed to finalize archive {}: {}; previous archive is intact at {} and is removed by the next commit, recover it by hand",
                self.archive_path.display(),
                error,
                self.staging_path.display()
            )
        } else {
            format!(
                "Failed to finalize archive {}: {}",
                self.archive_path.display(),
                error
            )
        }
    }

    fn discard_stale_staging(&self) {
        match fs::remove_file(&self.staging_path) {
            Ok(()) => tracing::debug!(
                "Removed stale staging archive {}",
                self.staging_path.display()
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove stale staging archive {}: {}",
                self.staging_path.display(),
                e
            ),
        }
    }

    /// Move the current archive to the staging name. Returns whether it moved.
    fn stage_previous(&self) -> bool {
        if !self.archive_path.exists() {
            return false;
        }
        match fs::rename(&self.archive_path, &self.staging_path) {
            Ok(()) => true,
            Err(e) => {
                // Prior entries are lost in this case; there is nothing to copy from.
                tracing::warn!(
                    "Failed to stage previous archive {}, its entries will be dropped: {}",
                    self.archive_path.display(),
                    e
                );
                false
            }
        }
    }

    fn restore_previous(&self) {
        if let Err(e) = fs::rename(&self.staging_path, &self.archive_path) {
            tracing::error!(
                "Failed to restore previous archive from {}: {}",
                self.staging_path.display(),
                e
            );
        }
    }

    fn copy_previous_entries(&self, writer: &mut ZipWriter<File>) {
        let mut previous = match File::open(&self.staging_path)
            .map_err(zip::result::ZipError::Io)
            .and_then(ZipArchive::new)
        {
            Ok(archive) => archive,
            Err(source) => {
                let e = ArchiveError::OpenArchive {
                    path: self.staging_path.clone(),
                    source,
                };
                tracing::warn!("{}, starting from an empty archive", e);
                return;
            }
        };

        for index in 0..previous.len() {
            let copied = previous
                .by_index_raw(index)
                .and_then(|entry| writer.raw_copy_file(entry));
            if let Err(e) = copied {
                tracing::warn!("Failed to copy entry #{} from previous archive: {}", index, e);
            }
        }
    }

    /// Append `file_path` as the last entry and return the entry name.
    fn append_file(
        &self,
        writer: &mut ZipWriter<File>,
        file_path: &Path,
    ) -> Result<String, ArchiveError> {
        let read_error = |source| ArchiveError::ReadSource {
            path: file_path.to_path_buf(),
            source,
        };

        let mut source = File::open(file_path).map_err(read_error)?;
        let metadata = source.metadata().map_err(read_error)?;
        let mut content = Vec::with_capacity(metadata.len() as usize);
        source.read_to_end(&mut content).map_err(read_error)?;

        let name = entry_name(file_path, self.entry_root.as_deref());
        writer
            .start_file(name.as_str(), entry_options(&metadata))
            .map_err(|source| ArchiveError::StartEntry {
                name: name.clone(),
                source,
            })?;
        writer
            .write_all(&content)
            .map_err(|source| ArchiveError::WriteEntry {
                name: name.clone(),
                source,
            })?;

        Ok(name)
    }
}

impl Committer for Archiver {
    fn commit(&self, path: &Path) -> Result<(), ArchiveError> {
        Archiver::commit(self, path)
    }
}

/// Read every entry of the archive at `path`, in order, duplicates included.
pub fn read_archive(path: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let open_error = |source| ArchiveError::OpenArchive {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path)
        .map_err(zip::result::ZipError::Io)
        .map_err(open_error)?;
    let mut archive = ZipArchive::new(file).map_err(open_error)?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(open_error)?;
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|source| open_error(zip::result::ZipError::Io(source)))?;
        entries.push(ArchiveEntry {
            name: entry.name().to_string(),
            content,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(entries: &[ArchiveEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_staging_name_is_prefixed() {
        let archiver = Archiver::new("/data/xml_archive.zip").unwrap();
        assert_eq!(archiver.staging_path(), Path::new("/data/_xml_archive.zip"));
    }

    #[test]
    fn test_archive_path_without_file_name() {
        assert!(matches!(
            Archiver::new("/"),
            Err(ArchiveError::InvalidArchivePath(_))
        ));
    }

    #[test]
    fn test_commit_into_missing_archive() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("a.xml");
        fs::write(&file, "<order id=\"1\"/>").unwrap();

        let archiver = Archiver::new(temp.path().join(DEFAULT_ARCHIVE_NAME))
            .unwrap()
            .with_entry_root(temp.path());
        archiver.commit(&file).unwrap();

        let entries = archiver.read_entries().unwrap();
        assert_eq!(names(&entries), vec!["a.xml"]);
        assert_eq!(entries[0].content, b"<order id=\"1\"/>");
        assert!(!archiver.staging_path().exists());
    }

    #[test]
    fn test_commit_appends_after_previous_entries() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a.xml");
        let b = temp.path().join("b.xml");
        fs::write(&a, "<a/>").unwrap();
        fs::write(&b, "<b/>").unwrap();

        let archiver = Archiver::new(temp.path().join(DEFAULT_ARCHIVE_NAME))
            .unwrap()
            .with_entry_root(temp.path());
        archiver.commit(&a).unwrap();
        archiver.commit(&b).unwrap();

        let entries = archiver.read_entries().unwrap();
        assert_eq!(names(&entries), vec!["a.xml", "b.xml"]);
        assert_eq!(entries[0].content, b"<a/>");
        assert_eq!(entries[1].content, b"<b/>");
    }

    #[test]
    fn test_same_file_twice_keeps_both_entries() {
        let temp = tempdir().unwrap();
        let f = temp.path().join("f.xml");
        fs::write(&f, "<v1/>").unwrap();

        let archiver = Archiver::new(temp.path().join(DEFAULT_ARCHIVE_NAME))
            .unwrap()
            .with_entry_root(temp.path());
        archiver.commit(&f).unwrap();
        fs::write(&f, "<v2/>").unwrap();
        archiver.commit(&f).unwrap();

        let entries = archiver.read_entries().unwrap();
        assert_eq!(names(&entries), vec!["f.xml", "f.xml"]);
        assert_eq!(entries[0].content, b"<v1/>");
        assert_eq!(entries[1].content, b"<v2/>");
    }

    #[test]
    fn test_nested_path_preserved_in_entry_name() {
        let temp = tempdir().unwrap();
        let nested = temp.path().join("orders").join("2024");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("o.xml");
        fs::write(&file, "<o/>").unwrap();

        let archiver = Archiver::new(temp.path().join(DEFAULT_ARCHIVE_NAME))
            .unwrap()
            .with_entry_root(temp.path());
        archiver.commit(&file).unwrap();

        assert_eq!(names(&archiver.read_entries().unwrap()), vec!["orders/2024/o.xml"]);
    }

    #[test]
    fn test_missing_source_fails_but_keeps_previous_entries() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a.xml");
        fs::write(&a, "<a/>").unwrap();

        let archiver = Archiver::new(temp.path().join(DEFAULT_ARCHIVE_NAME))
            .unwrap()
            .with_entry_root(temp.path());
        archiver.commit(&a).unwrap();

        let err = archiver.commit(&temp.path().join("gone.xml")).unwrap_err();
        assert!(matches!(err, ArchiveError::ReadSource { .. }));

        let entries = archiver.read_entries().unwrap();
        assert_eq!(names(&entries), vec!["a.xml"]);
    }

    #[test]
    fn test_corrupt_previous_archive_is_treated_as_empty() {
        let temp = tempdir().unwrap();
        let archive_path = temp.path().join(DEFAULT_ARCHIVE_NAME);
        fs::write(&archive_path, "not a zip").unwrap();
        let b = temp.path().join("b.xml");
        fs::write(&b, "<b/>").unwrap();

        let archiver = Archiver::new(&archive_path)
            .unwrap()
            .with_entry_root(temp.path());
        archiver.commit(&b).unwrap();

        assert_eq!(names(&archiver.read_entries().unwrap()), vec!["b.xml"]);
    }

    #[test]
    fn test_stale_staging_file_is_removed() {
        let temp = tempdir().unwrap();
        let archiver = Archiver::new(temp.path().join(DEFAULT_ARCHIVE_NAME))
            .unwrap()
            .with_entry_root(temp.path());
        fs::write(archiver.staging_path(), "leftover").unwrap();
        let a = temp.path().join("a.xml");
        fs::write(&a, "<a/>").unwrap();

        archiver.commit(&a).unwrap();

        assert!(!archiver.staging_path().exists());
        assert_eq!(names(&archiver.read_entries().unwrap()), vec!["a.xml"]);
    }

    #[test]
    fn test_create_failure_is_reported() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a.xml");
        fs::write(&a, "<a/>").unwrap();

        let archiver = Archiver::new(temp.path().join("missing").join(DEFAULT_ARCHIVE_NAME)).unwrap();
        let err = archiver.commit(&a).unwrap_err();
        assert!(matches!(err, ArchiveError::CreateArchive { .. }));
    }

    #[test]
    fn test_restore_previous_undoes_staging() {
        let temp = tempdir().unwrap();
        let archiver = Archiver::new(temp.path().join(DEFAULT_ARCHIVE_NAME))
            .unwrap()
            .with_entry_root(temp.path());
        let a = temp.path().join("a.xml");
        fs::write(&a, "<a/>").unwrap();
        archiver.commit(&a).unwrap();

        assert!(archiver.stage_previous());
        assert!(!archiver.archive_path().exists());
        archiver.restore_previous();

        assert!(!archiver.staging_path().exists());
        assert_eq!(names(&archiver.read_entries().unwrap()), vec!["a.xml"]);
    }

    #[test]
    fn test_failed_rename_to_staging_drops_previous_entries() {
        let temp = tempdir().unwrap();
        let archiver = Archiver::new(temp.path().join(DEFAULT_ARCHIVE_NAME))
            .unwrap()
            .with_entry_root(temp.path());
        let a = temp.path().join("a.xml");
        let b = temp.path().join("b.xml");
        fs::write(&a, "<a/>").unwrap();
        fs::write(&b, "<b/>").unwrap();
        archiver.commit(&a).unwrap();

        // A non-empty directory on the staging name survives the stale-file
        // cleanup and makes the rename fail.
        fs::create_dir_all(archiver.staging_path().join("occupied")).unwrap();
        assert!(!archiver.stage_previous());

        archiver.commit(&b).unwrap();

        let entries = archiver.read_entries().unwrap();
        assert_eq!(names(&entries), vec!["b.xml"]);
        assert_eq!(entries[0].content, b"<b/>");
        assert!(archiver.staging_path().is_dir());
    }

    #[test]
    fn test_finalize_failure_names_recoverable_copy() {
        let archiver = Archiver::new("/data/xml_archive.zip").unwrap();

        let with_previous = archiver.finalize_failure_message(true, &"disk full");
        assert!(with_previous.contains("/data/_xml_archive.zip"));
        assert!(with_previous.contains("disk full"));

        let without_previous = archiver.finalize_failure_message(false, &"disk full");
        assert!(!without_previous.contains("_xml_archive.zip"));
    }
}
