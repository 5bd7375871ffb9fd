//! Anchor gate: sentinel files whose existence proves the underlying mount
//! is attached. Scanning while the mount is detached would make targets
//! drop media, so the processor stalls until every anchor is back.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Succeeds iff every anchor path exists as a regular file.
pub(crate) fn check(anchors: &[PathBuf]) -> Result<()> {
    for anchor in anchors {
        if !is_regular_file(anchor) {
            return Err(Error::AnchorUnavailable(anchor.clone()));
        }
    }

    Ok(())
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}
