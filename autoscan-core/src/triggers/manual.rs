use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::split_file_path;
use crate::rewrite::{Rewrite, Rewriter};
use crate::{Scan, ScanSink, Verbosity};

/// The manual trigger mounts at a fixed path and has no name of its own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ManualConfig {
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub rewrite: Vec<Rewrite>,
    #[serde(default)]
    pub verbosity: Verbosity,
}

pub struct ManualTrigger {
    priority: i32,
    rewriter: Rewriter,
    verbosity: Verbosity,
}

impl ManualTrigger {
    pub fn new(config: ManualConfig) -> Self {
        Self {
            priority: config.priority,
            rewriter: Rewriter::new(config.rewrite),
            verbosity: config.verbosity,
        }
    }

    pub fn router(self, sink: Arc<dyn ScanSink>) -> Router {
        let state = Arc::new((self, sink));
        Router::new().route("/", post(handle)).with_state(state)
    }

    /// Each `path` query parameter names a changed file; the scan covers its
    /// parent folder.
    fn scans(&self, paths: &[String]) -> Vec<Scan> {
        let mut scans = Vec::with_capacity(paths.len());

        for path in paths {
            if let Some((folder, file)) = split_file_path(path) {
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
    State(state): State<Arc<(ManualTrigger, Arc<dyn ScanSink>)>>,
    Query(params): Query<Vec<(String, String)>>,
) -> StatusCode {
    let (trigger, sink) = (&state.0, &state.1);

    let paths: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == "path")
        .map(|(_, value)| value)
        .collect();

    if trigger.verbosity >= Verbosity::Debug {
        debug!(trigger = "manual", paths = ?paths, "Received request");
    }

    let scans = trigger.scans(&paths);
    if scans.is_empty() {
        warn!(trigger = "manual", "Request carries no usable paths");
        return StatusCode::BAD_REQUEST;
    }

    let count = scans.len();
    match sink.add_scans(scans).await {
        Ok(()) => {
            info!(trigger = "manual", paths = count, "Scans queued");
            StatusCode::OK
        }
        Err(err) => {
            error!(trigger = "manual", %err, "Failed queueing scans");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::test_support::RecordingSink;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn trigger() -> ManualTrigger {
        ManualTrigger::new(ManualConfig {
            priority: 5,
            rewrite: vec![Rewrite {
                from: "/downloads".to_string(),
                to: "/media".to_string(),
            }],
            verbosity: Verbosity::Default,
        })
    }

    async fn post_uri(router: Router, uri: &str) -> StatusCode {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        response.status()
    }

    #[tokio::test]
    async fn queues_one_scan_per_path_parameter() {
        let sink = RecordingSink::new();
        let status = post_uri(
            trigger().router(sink.clone()),
            "/?path=/downloads/Movies/X/x.mkv&path=/downloads/Movies/Y/y.mkv",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let scans = sink.scans();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].folder, "/media/Movies/X");
        assert_eq!(scans[0].file, "x.mkv");
        assert_eq!(scans[1].folder, "/media/Movies/Y");
        assert!(scans.iter().all(|scan| scan.priority == 5));
    }

    #[tokio::test]
    async fn request_without_paths_is_rejected() {
        let sink = RecordingSink::new();
        let status = post_uri(trigger().router(sink), "/").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sink_failure_maps_to_internal_error() {
        let sink = RecordingSink::failing();
        let status = post_uri(
            trigger().router(sink),
            "/?path=/downloads/Movies/X/x.mkv",
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
