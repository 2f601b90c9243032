use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PveKill,
    PvpKill,
    PvpDeath,
    Suicide,
    Crash,
    LevelUp,
}

impl NotificationKind {
    pub fn label(self) -> &'static str {
        match self {
            NotificationKind::PveKill => "pve_kill",
            NotificationKind::PvpKill => "pvp_kill",
            NotificationKind::PvpDeath => "pvp_death",
            NotificationKind::Suicide => "suicide",
            NotificationKind::Crash => "crash",
            NotificationKind::LevelUp => "level_up",
        }
    }
}

/// Outbound notification capability (e.g. a webhook). Best-effort: the core
/// logs failures and never retries.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotificationKind, payload: &serde_json::Value) -> Result<()>;
}

/// Sink that only writes notifications to the trace log.
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, kind: NotificationKind, payload: &serde_json::Value) -> Result<()> {
        tracing::info!(
            notification_kind = kind.label(),
            payload = %payload,
            "Notification"
        );
        Ok(())
    }
}

/// Runs the notification on the blocking pool without awaiting it.
pub(crate) fn dispatch_detached(
    sink: Arc<dyn NotificationSink>,
    kind: NotificationKind,
    payload: serde_json::Value,
) {
    tokio::task::spawn_blocking(move || {
        if let Err(error) = sink.notify(kind, &payload) {
            tracing::warn!(
                notification_kind = kind.label(),
                notify_error = %error,
                "Failed to deliver notification"
            );
        }
    });
}
