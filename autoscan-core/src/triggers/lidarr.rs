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
pub struct LidarrConfig {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub rewrite: Vec<Rewrite>,
    #[serde(default)]
    pub verbosity: Verbosity,
}

pub struct LidarrTrigger {
    name: String,
    priority: i32,
    rewriter: Rewriter,
    verbosity: Verbosity,
}

impl LidarrTrigger {
    pub fn new(config: LidarrConfig) -> Self {
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

    /// Album imports deliver absolute track paths; one scan per track keeps
    /// multi-disc folders as separate cohort rows.
    fn scans(&self, event: &LidarrEvent) -> Vec<Scan> {
        let mut scans = Vec::with_capacity(event.track_files.len());

        for track in &event.track_files {
            if let Some((folder, file)) = split_file_path(&track.path) {
                scans.push(Scan::new(
                    self.rewriter.rewrite(&folder),
                    file,
                    self.priority,
                ));
            }
        }

        scans
    }
}

async fn handle(
    State(state): State<Arc<(LidarrTrigger, Arc<dyn ScanSink>)>>,
    body: String,
) -> StatusCode {
    let (trigger, sink) = (&state.0, &state.1);

    if trigger.verbosity >= Verbosity::Debug {
        debug!(trigger = %trigger.name, payload = %body, "Received webhook");
    }

    let event: LidarrEvent = match serde_json::from_str(&body) {
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

    if event.event_type != "Download" {
        warn!(
            trigger = %trigger.name,
            event = %event.event_type,
            "Unsupported event"
        );
        return StatusCode::BAD_REQUEST;
    }

    let scans = trigger.scans(&event);
    if scans.is_empty() {
        warn!(trigger = %trigger.name, "Event carries no usable track paths");
        return StatusCode::BAD_REQUEST;
    }

    let count = scans.len();
    match sink.add_scans(scans).await {
        Ok(()) => {
            info!(trigger = %trigger.name, tracks = count, "Scans queued");
            StatusCode::OK
        }
        Err(err) => {
            error!(trigger = %trigger.name, %err, "Failed queueing scans");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
struct LidarrEvent {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(rename = "trackFiles", default)]
    track_files: Vec<LidarrTrackFile>,
}

#[derive(Debug, Deserialize)]
struct LidarrTrackFile {
    #[serde(default)]
    path: String,
}
