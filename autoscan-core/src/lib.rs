//! # Autoscan Core
//!
//! Core library for the autoscan daemon: a persistent, transactional queue
//! that coalesces bursts of media-library change notifications into minimal
//! "scan this folder" work for one or more media-server targets.
//!
//! ## Overview
//!
//! - **Processor**: admits scans from triggers, withdraws mature folder
//!   cohorts from the durable store and fans them out to every target.
//! - **Scan store**: a single SQLite file keyed on (folder, file) that
//!   survives restarts; rows merge on conflict and disappear only after all
//!   targets acknowledge a dispatch pass.
//! - **Triggers**: producers of [`Scan`]s: webhook handlers for the arr
//!   suite, a manual endpoint and a filesystem watcher.
//! - **Targets**: thin HTTP adapters (Plex, Emby) exposing `available()` and
//!   `scan(folder)`.

pub mod error;
pub mod processor;
pub mod rewrite;
pub mod store;
pub mod targets;
pub mod triggers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use error::{Error, Result};
pub use processor::{Processor, ProcessorConfig};
pub use rewrite::{Rewrite, Rewriter};
pub use targets::Target;

/// A single change notification and the row stored in the scan store.
///
/// `folder` is the absolute directory path as the targets will see it
/// (trigger-side rewrites already applied). `file` is the basename that
/// triggered the scan; multiple files per folder coexist as separate rows
/// and are dispatched together as one cohort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub folder: String,
    pub file: String,
    pub priority: i32,
    pub time: DateTime<Utc>,
    pub retries: i32,
}

impl Scan {
    pub fn new(folder: impl Into<String>, file: impl Into<String>, priority: i32) -> Self {
        Self {
            folder: folder.into(),
            file: file.into(),
            priority,
            time: Utc::now(),
            retries: 0,
        }
    }
}

/// A folder cohort aggregated for dispatch: every row sharing one folder,
/// handed to each target as a single scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub folder: String,
    pub files: Vec<String>,
    pub priority: i32,
    pub time: DateTime<Utc>,
    pub retries: i32,
}

impl ScanRequest {
    /// Aggregates a non-empty cohort. All rows are expected to share one
    /// folder; the request carries the max priority and the latest time.
    pub fn from_cohort(cohort: &[Scan]) -> Result<Self> {
        let first = cohort
            .first()
            .ok_or_else(|| Error::Internal("empty scan cohort".to_string()))?;

        let mut request = ScanRequest {
            folder: first.folder.clone(),
            files: Vec::with_capacity(cohort.len()),
            priority: first.priority,
            time: first.time,
            retries: first.retries,
        };

        for scan in cohort {
            request.files.push(scan.file.clone());
            request.priority = request.priority.max(scan.priority);
            request.time = request.time.max(scan.time);
            request.retries = request.retries.max(scan.retries);
        }

        Ok(request)
    }
}

/// Trigger-facing port: anything that accepts scans for queueing.
///
/// Triggers only ever produce scans through this trait; they never talk to
/// targets directly. [`Processor`] is the production implementation.
#[async_trait]
pub trait ScanSink: Send + Sync {
    async fn add_scans(&self, scans: Vec<Scan>) -> Result<()>;
}

/// Per-component log detail. Components emit payload-level logging only when
/// their configured verbosity asks for it; the global subscriber level still
/// applies on top.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Default,
    Debug,
    Trace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cohort_aggregates_max_priority_and_latest_time() {
        let mut early = Scan::new("/media/Movies/A", "a.mkv", 1);
        early.time = Utc::now() - chrono::Duration::minutes(5);
        let late = Scan::new("/media/Movies/A", "b.mkv", 3);

        let request = ScanRequest::from_cohort(&[early.clone(), late.clone()]).unwrap();
        assert_eq!(request.folder, "/media/Movies/A");
        assert_eq!(request.files, vec!["a.mkv", "b.mkv"]);
        assert_eq!(request.priority, 3);
        assert_eq!(request.time, late.time);
    }

    #[test]
    fn cohort_rejects_empty_input() {
        assert!(ScanRequest::from_cohort(&[]).is_err());
    }
}
