use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::split_file_path;
use crate::rewrite::{Rewrite, Rewriter};
use crate::{Scan, ScanSink, Verbosity};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SonarrConfig {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub rewrite: Vec<Rewrite>,
    #[serde(default)]
    pub verbosity: Verbosity,
}

pub struct SonarrTrigger {
    name: String,
    priority: i32,
    rewriter: Rewriter,
    verbosity: Verbosity,
}

impl SonarrTrigger {
    pub fn new(config: SonarrConfig) -> Self {
        Self {
            name: config.name,
            priority: config.priority,
            rewriter: Rewriter::new(config.rewrite),
            verbosity: config.verbosity,
        }
    }

    pub fn router(self, sink: Arc<dyn ScanSink>) -> Router {
        let state = Arc::new((self, sink));
        Router::new().route("/", post(handle)).with_state(state)
    }

    /// Episode files land in season subfolders; the scan covers the folder
    /// that actually holds the file.
    fn scans(&self, event: &SonarrEvent) -> Option<Vec<Scan>> {
        let joined =
            Path::new(&event.series.path).join(&event.episode_file.relative_path);
        let (folder, file) = split_file_path(joined.to_str()?)?;

        let scan = Scan::new(self.rewriter.rewrite(&folder), file, self.priority);
        Some(vec![scan])
    }
}

async fn handle(
    State(state): State<Arc<(SonarrTrigger, Arc<dyn ScanSink>)>>,
    body: String,
) -> StatusCode {
    let (trigger, sink) = (&state.0, &state.1);

    if trigger.verbosity >= Verbosity::Debug {
        debug!(trigger = %trigger.name, payload = %body, "Received webhook");
    }

    let event: SonarrEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(trigger = %trigger.name, %err, "Failed decoding webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    if event.event_type == "Test" {
        info!(trigger = %trigger.name, "Received test event");
        return StatusCode::OK;
    }

    if event.event_type != "Download" || event.series.path.is_empty() {
        warn!(
            trigger = %trigger.name,
            event = %event.event_type,
            "Unsupported event"
        );
        return StatusCode::BAD_REQUEST;
    }

    let scans = match trigger.scans(&event) {
        Some(scans) => scans,
        None => {
            warn!(trigger = %trigger.name, "Event carries no usable file path");
            return StatusCode::BAD_REQUEST;
        }
    };

    match sink.add_scans(scans).await {
        Ok(()) => {
            info!(trigger = %trigger.name, series = %event.series.path, "Scan queued");
            StatusCode::OK
        }
        Err(err) => {
            error!(trigger = %trigger.name, %err, "Failed queueing scan");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
struct SonarrEvent {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(default)]
    series: SonarrSeries,
    #[serde(rename = "episodeFile", default)]
    episode_file: SonarrEpisodeFile,
}

#[derive(Debug, Default, Deserialize)]
struct SonarrSeries {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct SonarrEpisodeFile {
    #[serde(rename = "relativePath", default)]
    relative_path: String,
}
