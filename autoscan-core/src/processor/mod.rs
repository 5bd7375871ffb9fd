//! The processor: admits scans from triggers, enforces age and anchor
//! preconditions, withdraws mature folder cohorts and fans them out to every
//! configured target with retry accounting.

mod anchors;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::store::ScanStore;
use crate::targets::Target;
use crate::{Error, Result, Scan, ScanRequest, ScanSink};

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Sentinel files that must exist before any dispatch pass runs.
    pub anchors: Vec<PathBuf>,
    /// Path of the SQLite scan store.
    pub datastore_path: PathBuf,
    /// A folder is dispatched only once all of its rows are at least this old.
    pub minimum_age: Duration,
}

pub struct Processor {
    anchors: Vec<PathBuf>,
    minimum_age: chrono::Duration,
    store: ScanStore,
}

impl Processor {
    pub async fn new(config: ProcessorConfig) -> Result<Self> {
        let store = ScanStore::open(&config.datastore_path).await?;
        let minimum_age = chrono::Duration::from_std(config.minimum_age)
            .map_err(|err| Error::Internal(format!("minimum-age out of range: {err}")))?;

        let queued = store.len().await?;
        if queued > 0 {
            info!(queued, "Scan store carries queued scans from a previous run");
        }

        Ok(Self {
            anchors: config.anchors,
            minimum_age,
            store,
        })
    }

    /// Validates and queues a batch of scans atomically.
    ///
    /// The whole batch is rejected with [`Error::InvalidScan`] when any scan
    /// carries an empty folder, an empty file or a relative folder path; no
    /// partial application occurs.
    pub async fn add(&self, scans: Vec<Scan>) -> Result<()> {
        for scan in &scans {
            validate(scan)?;
        }

        if scans.is_empty() {
            return Ok(());
        }

        self.store.upsert(&scans).await?;
        debug!(count = scans.len(), "Scans queued");
        Ok(())
    }

    /// Probes every target's `available()`, returning the first failure.
    pub async fn check_availability(&self, targets: &[Box<dyn Target>]) -> Result<()> {
        for target in targets {
            target.available().await.map_err(classify_target_error)?;
        }

        Ok(())
    }

    /// One dispatch pass: anchor gate, cohort withdrawal, target fan-out.
    ///
    /// The pass is all-or-nothing per folder: either every target accepts the
    /// scan and the folder's rows are deleted, or the rows remain with their
    /// retry counters bumped.
    pub async fn process(&self, targets: &[Box<dyn Target>]) -> Result<()> {
        anchors::check(&self.anchors)?;

        let cutoff = Utc::now() - self.minimum_age;
        let cohort = self.store.mature_folder(cutoff).await?;
        let request = ScanRequest::from_cohort(&cohort)?;

        debug!(
            folder = %request.folder,
            files = request.files.len(),
            priority = request.priority,
            retries = request.retries,
            "Dispatching folder cohort"
        );

        for target in targets {
            if let Err(err) = target.scan(&request).await {
                self.store.increment_retries(&request.folder).await?;
                return Err(classify_target_error(err));
            }
        }

        self.store.delete_folder(&request.folder).await?;
        info!(folder = %request.folder, files = request.files.len(), "Scan moved to targets");
        Ok(())
    }
}

#[async_trait]
impl ScanSink for Processor {
    async fn add_scans(&self, scans: Vec<Scan>) -> Result<()> {
        self.add(scans).await
    }
}

/// Fatal errors bubble unchanged; everything else a target reports is treated
/// as a transient outage.
fn classify_target_error(err: Error) -> Error {
    match err {
        err @ (Error::Fatal(_) | Error::TargetUnavailable(_)) => err,
        other => Error::TargetUnavailable(other.to_string()),
    }
}

fn validate(scan: &Scan) -> Result<()> {
    if scan.folder.is_empty() {
        return Err(Error::InvalidScan("empty folder".to_string()));
    }

    if scan.file.is_empty() {
        return Err(Error::InvalidScan(format!(
            "{}: empty file name",
            scan.folder
        )));
    }

    if !Path::new(&scan.folder).is_absolute() {
        return Err(Error::InvalidScan(format!(
            "{}: folder is not absolute",
            scan.folder
        )));
    }

    Ok(())
}
