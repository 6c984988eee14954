//! Naming and metadata for entries written into the archive.

use chrono::{DateTime, Datelike, Local, Timelike};
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use zip::write::FileOptions;
use zip::CompressionMethod;

/// Resolve `dir` against the working directory without following symlinks.
///
/// The watcher reports absolute paths even for a relative watch root
/// (`.` becomes `/cwd/./a.xml`), so names must be stripped against an
/// absolute root to come out relative.
pub fn absolute_root(dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(dir),
        Err(e) => {
            tracing::warn!(
                "Cannot resolve {} against the working directory: {}",
                dir.display(),
                e
            );
            dir.to_path_buf()
        }
    }
}

/// Derive the archive entry name for `path`.
///
/// The path is made relative to `root` when it lives underneath it, then
/// `.`, root and prefix components are dropped and the rest is joined with
/// `/`, so directory structure survives inside the archive.
pub fn entry_name(path: &Path, root: Option<&Path>) -> String {
    let relative = root
        .and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);

    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Entry options for a freshly read file: Deflate plus the file's mtime and mode.
pub fn entry_options(metadata: &Metadata) -> FileOptions {
    let mut options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    if let Some(modified) = metadata.modified().ok().and_then(zip_datetime) {
        options = options.last_modified_time(modified);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode());
    }

    options
}

/// Convert a filesystem timestamp to the archive's local-time format.
///
/// Returns `None` outside the representable range (1980..=2107).
pub fn zip_datetime(time: SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = time.into();
    let year = u16::try_from(local.year()).ok()?;

    zip::DateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_entry_name_strips_current_dir() {
        assert_eq!(entry_name(Path::new("./a.xml"), None), "a.xml");
        assert_eq!(entry_name(Path::new("a.xml"), None), "a.xml");
    }

    #[test]
    fn test_entry_name_keeps_directories() {
        assert_eq!(
            entry_name(Path::new("./orders/2024/a.xml"), None),
            "orders/2024/a.xml"
        );
    }

    #[test]
    fn test_entry_name_relative_to_root() {
        let root = PathBuf::from("/srv/inbox");
        assert_eq!(
            entry_name(Path::new("/srv/inbox/sub/a.xml"), Some(&root)),
            "sub/a.xml"
        );
        assert_eq!(
            entry_name(Path::new("/elsewhere/b.xml"), Some(&root)),
            "elsewhere/b.xml"
        );
    }

    #[test]
    fn test_relative_watch_root_yields_bare_name() {
        let root = absolute_root(Path::new("."));
        assert!(root.is_absolute());

        let reported = std::env::current_dir().unwrap().join("./a.xml");
        assert_eq!(entry_name(&reported, Some(&root)), "a.xml");

        let nested = std::env::current_dir().unwrap().join("./orders/b.xml");
        assert_eq!(entry_name(&nested, Some(&root)), "orders/b.xml");
    }

    #[test]
    fn test_absolute_root_keeps_absolute_dir() {
        let dir = std::env::temp_dir();
        assert_eq!(absolute_root(&dir), dir);
    }

    #[test]
    fn test_zip_datetime_range() {
        assert!(zip_datetime(UNIX_EPOCH).is_none());

        let mid_2020 = UNIX_EPOCH + Duration::from_secs(1_593_561_600);
        let converted = zip_datetime(mid_2020).expect("2020 is representable");
        assert_eq!(converted.year(), 2020);
    }
}
