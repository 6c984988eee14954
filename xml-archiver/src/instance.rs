//! Process-wide singleton guard.
//!
//! A named lock file in a machine-wide directory, held with an exclusive
//! advisory lock for as long as the returned guard lives. Per-user temp
//! directories (`%TEMP%`, `$TMPDIR`) are avoided so that two users cannot
//! each hold "the" lock.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Well-known lock name shared by every instance on the machine.
pub const DEFAULT_LOCK_NAME: &str = "EBCOM_XML_ARCHIVER";

/// Errors raised while acquiring the singleton lock.
#[derive(Error, Debug)]
pub enum InstanceLockError {
    #[error("Failed to open lock file {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("Program already running (lock held at {})", .path.display())]
    AlreadyRunning { path: PathBuf },
}

/// Held exclusive lock. Released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock named `name` in the first usable machine-wide directory.
    ///
    /// Directories that do not exist or cannot be written are skipped; a
    /// held lock in any of them fails immediately.
    pub fn acquire(name: &str) -> Result<Self, InstanceLockError> {
        let mut last_error = None;
        for dir in lock_dirs() {
            match Self::acquire_at(lock_path(&dir, name)) {
                Err(InstanceLockError::Open { path, source })
                    if matches!(
                        source.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                    ) =>
                {
                    tracing::debug!("Skipping lock location {}: {}", path.display(), source);
                    last_error = Some(InstanceLockError::Open { path, source });
                }
                result => return result,
            }
        }
        Err(last_error.unwrap_or_else(|| InstanceLockError::Open {
            path: PathBuf::from(name),
            source: io::Error::new(io::ErrorKind::NotFound, "no lock directory available"),
        }))
    }

    /// Acquire a lock at an explicit path. Fails immediately if it is held.
    pub fn acquire_at(path: impl Into<PathBuf>) -> Result<Self, InstanceLockError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| InstanceLockError::Open {
                path: path.clone(),
                source,
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(InstanceLockError::AlreadyRunning { path });
        }

        tracing::debug!("Acquired instance lock {}", path.display());
        Ok(Self { file, path })
    }

    /// Location of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Candidate lock directories, most preferred first. All are shared by every
/// user on the machine.
pub fn lock_dirs() -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        let mut dirs = Vec::new();
        if let Some(program_data) = std::env::var_os("ProgramData") {
            dirs.push(PathBuf::from(program_data));
        }
        dirs.push(PathBuf::from(r"C:\ProgramData"));
        dirs
    }

    #[cfg(not(windows))]
    {
        vec![
            PathBuf::from("/run/lock"),
            PathBuf::from("/var/lock"),
            PathBuf::from("/tmp"),
        ]
    }
}

/// Lock file path for `name` inside `dir`.
pub fn lock_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.lock", name))
}
