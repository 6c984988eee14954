//! Notification source adapter.

pub mod watcher;

pub use watcher::{forward_event, is_write_event, is_xml_path, WatcherError, XmlWriteWatcher};
