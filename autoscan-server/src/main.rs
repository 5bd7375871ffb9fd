//! # Autoscan
//!
//! Long-running daemon that aggregates media-library change notifications
//! from triggers (webhooks, a manual endpoint, filesystem watchers) and
//! dispatches coalesced, delayed, deduplicated folder scans to media-server
//! targets. Queued work is durable: a restart resumes exactly where the
//! previous run stopped.

mod auth;
mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{middleware, Router};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

use autoscan_core::targets::{EmbyTarget, PlexTarget};
use autoscan_core::triggers::inotify::InotifyTrigger;
use autoscan_core::triggers::lidarr::LidarrTrigger;
use autoscan_core::triggers::manual::ManualTrigger;
use autoscan_core::triggers::radarr::RadarrTrigger;
use autoscan_core::triggers::sonarr::SonarrTrigger;
use autoscan_core::{Error, Processor, ProcessorConfig, ScanSink, Target};

use crate::config::Config;

/// Delay between retries while the queue is empty or a precondition fails.
const RETRY_DELAY: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "autoscan")]
#[command(version)]
#[command(about = "Scan media into target media servers")]
struct Args {
    /// Config file path
    #[arg(long, env = "AUTOSCAN_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    /// Database file path
    #[arg(long, env = "AUTOSCAN_DATABASE", default_value = "autoscan.db")]
    database: PathBuf,

    /// Log file path
    #[arg(long, env = "AUTOSCAN_LOG", default_value = "activity.log")]
    log: PathBuf,

    /// Log level verbosity (-v debug, -vv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_guard = logging::init(&args.log, args.verbosity)?;

    let config = Config::load(&args.config)?;

    let processor = Arc::new(
        Processor::new(ProcessorConfig {
            anchors: config.anchors.clone(),
            datastore_path: args.database.clone(),
            minimum_age: config.minimum_age,
        })
        .await
        .context("failed initialising processor")?,
    );

    info!(
        minimum_age = %humantime::format_duration(config.minimum_age),
        anchors = config.anchors.len(),
        "Initialised processor"
    );

    if !config.auth_enabled() && config.triggers.webhook_count() > 0 {
        warn!("Webhooks running without authentication");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let sink: Arc<dyn ScanSink> = processor.clone();

    // Daemon triggers
    let mut inotify_count = 0usize;
    for trigger_config in config.triggers.inotify.clone() {
        let trigger = InotifyTrigger::new(trigger_config)
            .context("failed initialising inotify trigger")?;

        inotify_count += 1;
        tokio::spawn(trigger.run(sink.clone(), shutdown_rx.clone()));
    }

    // HTTP triggers
    let manual = ManualTrigger::new(config.triggers.manual.clone().unwrap_or_default());
    let mut triggers_router = Router::new().nest("/manual", manual.router(sink.clone()));

    for trigger_config in config.triggers.radarr.clone() {
        let name = trigger_config.name.clone();
        let trigger = RadarrTrigger::new(trigger_config);
        triggers_router = triggers_router.nest(&format!("/{name}"), trigger.router(sink.clone()));
    }

    for trigger_config in config.triggers.sonarr.clone() {
        let name = trigger_config.name.clone();
        let trigger = SonarrTrigger::new(trigger_config);
        triggers_router = triggers_router.nest(&format!("/{name}"), trigger.router(sink.clone()));
    }

    for trigger_config in config.triggers.lidarr.clone() {
        let name = trigger_config.name.clone();
        let trigger = LidarrTrigger::new(trigger_config);
        triggers_router = triggers_router.nest(&format!("/{name}"), trigger.router(sink.clone()));
    }

    let mut app = Router::new().nest("/triggers", triggers_router);
    if let Some(auth_config) = config.auth() {
        app = app.layer(middleware::from_fn_with_state(
            Arc::new(auth_config.clone()),
            auth::require_basic_auth,
        ));
    }

    info!(
        manual = 1,
        inotify = inotify_count,
        radarr = config.triggers.radarr.len(),
        sonarr = config.triggers.sonarr.len(),
        lidarr = config.triggers.lidarr.len(),
        "Initialised triggers"
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed binding port {}", config.port))?;

    info!(port = config.port, "Starting server");

    let server_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let shutdown = async move {
            let mut rx = server_shutdown;
            let _ = rx.changed().await;
        };

        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(%err, "Web server failed");
        }
    });

    // Targets
    let mut targets: Vec<Box<dyn Target>> = Vec::new();

    for target_config in config.targets.plex.clone() {
        let url = target_config.url.clone();
        let target = PlexTarget::new(target_config)
            .await
            .with_context(|| format!("failed initialising plex target {url}"))?;
        targets.push(Box::new(target));
    }

    for target_config in config.targets.emby.clone() {
        let url = target_config.url.clone();
        let target = EmbyTarget::new(target_config)
            .await
            .with_context(|| format!("failed initialising emby target {url}"))?;
        targets.push(Box::new(target));
    }

    info!(
        plex = config.targets.plex.len(),
        emby = config.targets.emby.len(),
        "Initialised targets"
    );

    run_dispatch_loop(processor, targets, config.scan_delay, shutdown_rx).await?;

    info!("Shutdown complete");
    Ok(())
}

/// The driver loop: re-probes target availability, runs dispatch passes and
/// maps each outcome to the matching delay. A fatal error stalls dispatch
/// permanently while triggers keep queueing; an unclassified error aborts
/// the daemon.
async fn run_dispatch_loop(
    processor: Arc<Processor>,
    targets: Vec<Box<dyn Target>>,
    scan_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!("Processor started");

    let mut targets_available = false;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        if !targets_available {
            match processor.check_availability(&targets).await {
                Ok(()) => targets_available = true,
                Err(err) if err.is_fatal() => {
                    error!(
                        %err,
                        "Fatal error occurred while checking target availability, processor stopped, triggers will continue"
                    );
                    return stall(&mut shutdown).await;
                }
                Err(err) => {
                    error!(%err, "Not all targets are available, retrying in 15 seconds");
                    if sleep_or_shutdown(RETRY_DELAY, &mut shutdown).await {
                        return Ok(());
                    }
                    continue;
                }
            }
        }

        let delay = match processor.process(&targets).await {
            Ok(()) => {
                // Breathing room between successful dispatches.
                scan_delay
            }
            Err(Error::NoScans) => {
                trace!("No scans are available, retrying in 15 seconds");
                RETRY_DELAY
            }
            Err(err @ Error::AnchorUnavailable(_)) => {
                error!(%err, "Not all anchor files are available, retrying in 15 seconds");
                RETRY_DELAY
            }
            Err(err @ Error::TargetUnavailable(_)) => {
                targets_available = false;
                error!(%err, "Not all targets are available, retrying in 15 seconds");
                RETRY_DELAY
            }
            Err(err @ Error::Fatal(_)) => {
                error!(
                    %err,
                    "Fatal error occurred while processing targets, processor stopped, triggers will continue"
                );
                return stall(&mut shutdown).await;
            }
            Err(err) => {
                error!(%err, "Failed processing targets");
                return Err(err.into());
            }
        };

        if sleep_or_shutdown(delay, &mut shutdown).await {
            return Ok(());
        }
    }
}

/// Sleeps, returning `true` when interrupted by shutdown.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.changed() => true,
    }
}

/// Dispatch halts while triggers keep enqueueing; queued scans persist.
async fn stall(shutdown: &mut watch::Receiver<bool>) -> anyhow::Result<()> {
    let _ = shutdown.changed().await;
    Ok(())
}
