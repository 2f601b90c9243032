use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{LogTailer, TickOutcome};

/// Drives `tailer` on a fixed interval, plus an extra tick whenever the log
/// file changes on disk. Each tick runs detached so a slow pass never delays
/// the schedule; the tailer's own guard drops ticks that overlap it.
pub fn spawn_tailing_driver(
    tailer: Arc<LogTailer>,
    log_path: Option<PathBuf>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (wake_sender, mut wake_receiver) = mpsc::unbounded_channel::<()>();
        // Held for the lifetime of the driver; dropping it stops notifications.
        let _watcher = log_path
            .as_deref()
            .and_then(|log_path| watch_log_directory(log_path, wake_sender));

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(()) = wake_receiver.recv() => {
                    tracing::trace!("Game log changed, requesting tailing pass");
                }
            }

            let tailer = Arc::clone(&tailer);
            tokio::spawn(async move {
                if let TickOutcome::AlreadyRunning = tailer.tick().await {
                    tracing::trace!("Tailing tick skipped");
                }
            });
        }
    })
}

fn watch_log_directory(
    log_path: &Path,
    wake_sender: mpsc::UnboundedSender<()>,
) -> Option<notify::RecommendedWatcher> {
    let watched_log_path = log_path.to_path_buf();
    let watcher_result = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                if is_relevant_notification(&event, &watched_log_path)
                    && wake_sender.send(()).is_err()
                {
                    tracing::debug!("Game log watcher wake receiver dropped");
                }
            }
            Err(error) => {
                tracing::warn!(watch_error = %error, "Game log watcher error");
            }
        }
    });

    let mut watcher = match watcher_result {
        Ok(watcher) => watcher,
        Err(error) => {
            tracing::warn!(
                watch_error = %error,
                "Failed to create game log watcher, relying on interval polling"
            );
            return None;
        }
    };

    let Some(watch_directory) = log_path.parent() else {
        tracing::warn!(log_path = %log_path.display(), "Game log has no parent directory to watch");
        return None;
    };

    if let Err(error) = watcher.watch(watch_directory, RecursiveMode::NonRecursive) {
        tracing::warn!(
            watch_directory = %watch_directory.display(),
            watch_error = %error,
            "Failed to watch game log directory, relying on interval polling"
        );
        return None;
    }

    tracing::debug!(watch_directory = %watch_directory.display(), "Watching game log directory");
    Some(watcher)
}

fn is_relevant_notification(event: &Event, log_path: &Path) -> bool {
    let relevant_kind = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    if !relevant_kind {
        return false;
    }

    let Some(log_file_name) = log_path.file_name() else {
        return false;
    };

    event.paths.iter().any(|path| {
        path == log_path
            || path
                .file_name()
                .map(|file_name| file_name == log_file_name)
                .unwrap_or(false)
    })
}
