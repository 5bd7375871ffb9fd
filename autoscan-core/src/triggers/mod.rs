//! Triggers: producers of [`Scan`](crate::Scan)s. HTTP triggers mount on the
//! daemon's router under `/triggers/<name>`; daemon triggers run as
//! background tasks until shutdown. Triggers only ever feed the
//! [`ScanSink`](crate::ScanSink); they never talk to targets.

pub mod inotify;
pub mod lidarr;
pub mod manual;
pub mod radarr;
pub mod sonarr;

use std::path::Path;

/// Splits a file path into (folder, file). Returns `None` for paths without
/// a parent directory or without a final component.
fn split_file_path(path: &str) -> Option<(String, String)> {
    let path = Path::new(path);
    let folder = path.parent()?.to_str()?.to_string();
    let file = path.file_name()?.to_str()?.to_string();

    if folder.is_empty() {
        return None;
    }

    Some((folder, file))
}
