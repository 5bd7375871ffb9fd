use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy the processor reasons about.
///
/// The driver loop matches on these variants to decide between retrying,
/// re-probing target availability, stalling permanently and aborting.
#[derive(Error, Debug)]
pub enum Error {
    /// Sentinel: the queue holds no folder whose rows are all mature.
    #[error("no scans are available")]
    NoScans,

    /// An anchor file is missing, the underlying mount is presumed detached.
    #[error("anchor is not available: {0}")]
    AnchorUnavailable(PathBuf),

    /// A target failed transiently; the cohort is retained and retried.
    #[error("target is not available: {0}")]
    TargetUnavailable(String),

    /// Irrecoverable target or config state, e.g. an unsupported server
    /// version. The dispatch loop halts while triggers keep accepting.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// Caller-side input validation in `add`; no state change occurred.
    #[error("invalid scan: {0}")]
    InvalidScan(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

/// Targets speak HTTP; a failed request is a transient target failure unless
/// the target itself classifies it otherwise.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TargetUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
