//! Media-server targets: thin HTTP adapters the processor fans cohorts out
//! to. A target owns its rewriter and its library map; a target that finds
//! no library containing the folder succeeds silently (disclaim).

mod emby;
mod plex;

use async_trait::async_trait;

use crate::{Result, ScanRequest};

pub use emby::{EmbyConfig, EmbyTarget};
pub use plex::{PlexConfig, PlexTarget};

/// A media server endpoint capable of rescanning a folder.
///
/// `scan` errors classify as [`crate::Error::Fatal`] only for irrecoverable
/// server state; everything else is treated as a transient outage by the
/// processor.
#[async_trait]
pub trait Target: Send + Sync {
    /// Cheap reachability probe, called before dispatch resumes.
    async fn available(&self) -> Result<()>;

    /// Asks the server to rescan the request's folder.
    async fn scan(&self, request: &ScanRequest) -> Result<()>;
}
