use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::EventKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace};

use super::split_file_path;
use crate::rewrite::{Rewrite, Rewriter};
use crate::{Error, Result, Scan, ScanSink, Verbosity};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct InotifyConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub rewrite: Vec<Rewrite>,
    #[serde(default)]
    pub verbosity: Verbosity,
    pub paths: Vec<InotifyPath>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InotifyPath {
    pub path: PathBuf,
}

fn default_name() -> String {
    "inotify".to_string()
}

/// Daemon trigger: watches configured roots recursively and queues a scan
/// for the parent folder of every created or modified file.
pub struct InotifyTrigger {
    name: String,
    priority: i32,
    rewriter: Rewriter,
    verbosity: Verbosity,
    paths: Vec<PathBuf>,
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl InotifyTrigger {
    pub fn new(config: InotifyConfig) -> Result<Self> {
        Ok(Self {
            name: config.name,
            priority: config.priority,
            rewriter: Rewriter::new(config.rewrite),
            verbosity: config.verbosity,
            paths: config.paths.into_iter().map(|p| p.path).collect(),
            include: compile_patterns(&config.include)?,
            exclude: compile_patterns(&config.exclude)?,
        })
    }

    /// Runs until shutdown. Sink failures are logged and swallowed; the
    /// upstream inotify queue cannot refuse events anyway.
    pub async fn run(
        self,
        sink: Arc<dyn ScanSink>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let name = self.name.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => error!(trigger = %name, %err, "Watch error"),
            },
            notify::Config::default(),
        )
        .map_err(|err| Error::Fatal(format!("failed creating watcher: {err}")))?;

        for path in &self.paths {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|err| {
                    Error::Fatal(format!("failed watching {}: {err}", path.display()))
                })?;
        }

        info!(
            trigger = %self.name,
            roots = self.paths.len(),
            "Watching for filesystem changes"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(sink.as_ref(), event).await,
                    None => break,
                },
            }
        }

        debug!(trigger = %self.name, "Watcher stopped");
        Ok(())
    }

    async fn handle_event(&self, sink: &dyn ScanSink, event: Event) {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }

        if self.verbosity >= Verbosity::Trace {
            trace!(trigger = %self.name, event = ?event, "Filesystem event");
        }

        let scans: Vec<Scan> = event
            .paths
            .iter()
            .filter_map(|path| self.scan_for_path(path))
            .collect();

        if scans.is_empty() {
            return;
        }

        if let Err(err) = sink.add_scans(scans).await {
            error!(trigger = %self.name, %err, "Failed queueing scans");
        }
    }

    fn scan_for_path(&self, path: &Path) -> Option<Scan> {
        let text = path.to_str()?;

        if self.exclude.iter().any(|pattern| pattern.matches(text)) {
            return None;
        }

        if !self.include.is_empty()
            && !self.include.iter().any(|pattern| pattern.matches(text))
        {
            return None;
        }

        let (folder, file) = split_file_path(text)?;
        Some(Scan::new(
            self.rewriter.rewrite(&folder),
            file,
            self.priority,
        ))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            glob::Pattern::new(pattern)
                .map_err(|err| Error::Fatal(format!("invalid glob '{pattern}': {err}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::test_support::RecordingSink;
    use notify::event::CreateKind;
    use std::time::Duration;

    fn trigger(include: &[&str], exclude: &[&str]) -> InotifyTrigger {
        InotifyTrigger::new(InotifyConfig {
            name: "inotify".to_string(),
            priority: 1,
            rewrite: vec![Rewrite {
                from: "/mnt/local".to_string(),
                to: "/media".to_string(),
            }],
            verbosity: Verbosity::Default,
            paths: vec![InotifyPath {
                path: PathBuf::from("/mnt/local"),
            }],
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn rewrites_folder_and_splits_file() {
        let trigger = trigger(&[], &[]);
        let scan = trigger
            .scan_for_path(Path::new("/mnt/local/Movies/X/x.mkv"))
            .unwrap();

        assert_eq!(scan.folder, "/media/Movies/X");
        assert_eq!(scan.file, "x.mkv");
        assert_eq!(scan.priority, 1);
    }

    #[test]
    fn excluded_paths_are_dropped() {
        let trigger = trigger(&[], &["**/*.partial~"]);

        assert!(trigger
            .scan_for_path(Path::new("/mnt/local/Movies/X/x.mkv.partial~"))
            .is_none());
        assert!(trigger
            .scan_for_path(Path::new("/mnt/local/Movies/X/x.mkv"))
            .is_some());
    }

    #[test]
    fn include_list_restricts_matches() {
        let trigger = trigger(&["**/*.mkv"], &[]);

        assert!(trigger
            .scan_for_path(Path::new("/mnt/local/Movies/X/x.mkv"))
            .is_some());
        assert!(trigger
            .scan_for_path(Path::new("/mnt/local/Movies/X/x.nfo"))
            .is_none());
    }

    #[test]
    fn invalid_glob_fails_construction() {
        let result = InotifyTrigger::new(InotifyConfig {
            name: "inotify".to_string(),
            priority: 0,
            rewrite: Vec::new(),
            verbosity: Verbosity::Default,
            paths: Vec::new(),
            include: Vec::new(),
            exclude: vec!["[".to_string()],
        });

        assert!(matches!(result, Err(Error::Fatal(_))));
    }

    #[tokio::test]
    async fn ignores_event_kinds_other_than_create_and_modify() {
        let trigger = trigger(&[], &[]);
        let sink = RecordingSink::new();

        let mut event = Event::new(EventKind::Remove(notify::event::RemoveKind::File));
        event = event.add_path(PathBuf::from("/mnt/local/Movies/X/x.mkv"));
        trigger.handle_event(sink.as_ref(), event).await;

        assert!(sink.scans().is_empty());

        let mut event = Event::new(EventKind::Create(CreateKind::File));
        event = event.add_path(PathBuf::from("/mnt/local/Movies/X/x.mkv"));
        trigger.handle_event(sink.as_ref(), event).await;

        assert_eq!(sink.scans().len(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = InotifyTrigger::new(InotifyConfig {
            name: "inotify".to_string(),
            priority: 0,
            rewrite: Vec::new(),
            verbosity: Verbosity::Default,
            paths: vec![InotifyPath {
                path: dir.path().to_path_buf(),
            }],
            include: Vec::new(),
            exclude: Vec::new(),
        })
        .unwrap();

        let sink = RecordingSink::new();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(trigger.run(sink, rx));

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
