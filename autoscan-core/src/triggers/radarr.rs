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
pub struct RadarrConfig {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub rewrite: Vec<Rewrite>,
    #[serde(default)]
    pub verbosity: Verbosity,
}

pub struct RadarrTrigger {
    name: String,
    priority: i32,
    rewriter: Rewriter,
    verbosity: Verbosity,
}

impl RadarrTrigger {
    pub fn new(config: RadarrConfig) -> Self {
        Self {
            name: config.name,
            priority: config.priority,
            rewriter: Rewriter::new(config.rewrite),
            verbosity: config.verbosity,
        }
    }

    /// Router serving the webhook; the caller mounts it at
    /// `/triggers/<name>`.
    pub fn router(self, sink: Arc<dyn ScanSink>) -> Router {
        let state = Arc::new((self, sink));
        Router::new().route("/", post(handle)).with_state(state)
    }

    fn scans(&self, event: &RadarrEvent) -> Option<Vec<Scan>> {
        let joined = Path::new(&event.movie.folder_path)
            .join(&event.movie_file.relative_path);
        let (folder, file) = split_file_path(joined.to_str()?)?;

        let scan = Scan::new(self.rewriter.rewrite(&folder), file, self.priority);
        Some(vec![scan])
    }
}

async fn handle(
    State(state): State<Arc<(RadarrTrigger, Arc<dyn ScanSink>)>>,
    body: String,
) -> StatusCode {
    let (trigger, sink) = (&state.0, &state.1);

    if trigger.verbosity >= Verbosity::Debug {
        debug!(trigger = %trigger.name, payload = %body, "Received webhook");
    }

    let event: RadarrEvent = match serde_json::from_str(&body) {
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

    if event.event_type != "Download" || event.movie.folder_path.is_empty() {
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
            info!(trigger = %trigger.name, folder = %event.movie.folder_path, "Scan queued");
            StatusCode::OK
        }
        Err(err) => {
            error!(trigger = %trigger.name, %err, "Failed queueing scan");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
struct RadarrEvent {
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(default)]
    movie: RadarrMovie,
    #[serde(rename = "movieFile", default)]
    movie_file: RadarrMovieFile,
}

#[derive(Debug, Default, Deserialize)]
struct RadarrMovie {
    #[serde(rename = "folderPath", default)]
    folder_path: String,
}

#[derive(Debug, Default, Deserialize)]
struct RadarrMovieFile {
    #[serde(rename = "relativePath", default)]
    relative_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::test_support::RecordingSink;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn trigger() -> RadarrTrigger {
        RadarrTrigger::new(RadarrConfig {
            name: "radarr".to_string(),
            priority: 2,
            rewrite: vec![Rewrite {
                from: "/downloads".to_string(),
                to: "/media".to_string(),
            }],
            verbosity: Verbosity::Default,
        })
    }

    fn download_payload() -> String {
        serde_json::json!({
            "eventType": "Download",
            "movie": { "folderPath": "/downloads/Movies/X" },
            "movieFile": { "relativePath": "x.mkv" }
        })
        .to_string()
    }

    async fn post_body(router: Router, body: String) -> StatusCode {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        response.status()
    }

    #[tokio::test]
    async fn download_event_queues_a_rewritten_scan() {
        let sink = RecordingSink::new();
        let status = post_body(trigger().router(sink.clone()), download_payload()).await;

        assert_eq!(status, StatusCode::OK);
        let scans = sink.scans();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].folder, "/media/Movies/X");
        assert_eq!(scans[0].file, "x.mkv");
        assert_eq!(scans[0].priority, 2);
    }

    #[tokio::test]
    async fn nested_relative_paths_scan_the_leaf_folder() {
        let trigger = trigger();
        let event = RadarrEvent {
            event_type: "Download".to_string(),
            movie: RadarrMovie {
                folder_path: "/downloads/Movies/X".to_string(),
            },
            movie_file: RadarrMovieFile {
                relative_path: "extras/x.mkv".to_string(),
            },
        };

        let scans = trigger.scans(&event).unwrap();
        assert_eq!(scans[0].folder, "/media/Movies/X/extras");
        assert_eq!(scans[0].file, "x.mkv");
    }

    #[tokio::test]
    async fn test_event_is_accepted_without_scans() {
        let sink = RecordingSink::new();
        let body = serde_json::json!({ "eventType": "Test" }).to_string();
        let status = post_body(trigger().router(sink.clone()), body).await;

        assert_eq!(status, StatusCode::OK);
        assert!(sink.scans().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let sink = RecordingSink::new();
        let status = post_body(trigger().router(sink), "not json".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unsupported_event_is_rejected() {
        let sink = RecordingSink::new();
        let body = serde_json::json!({ "eventType": "Rename" }).to_string();
        let status = post_body(trigger().router(sink), body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sink_failure_maps_to_internal_error() {
        let sink = RecordingSink::failing();
        let status = post_body(trigger().router(sink), download_payload()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
