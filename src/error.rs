//! Error types for log ingestion and stat persistence.

use std::path::Path;

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tailing the game log or updating stats.
#[derive(Error, Debug)]
pub enum Error {
    /// File system error with the path or operation that caused it.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error for a persisted record.
    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A classified line did not carry the fields its kind requires.
    #[error("Malformed {kind} line: {reason}")]
    MalformedLine { kind: &'static str, reason: String },

    /// A stat or cursor record could not be written.
    #[error("Failed to persist {target}: {reason}")]
    Persist { target: &'static str, reason: String },

    /// The serialized update queue has shut down.
    #[error("Stat update queue is closed")]
    QueueClosed,
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("Failed to {action} '{}'", path.display()), source)
    }

    pub(crate) fn json_at(action: &str, path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            context: format!("Failed to {action} '{}'", path.display()),
            source,
        }
    }

    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            kind,
            reason: reason.into(),
        }
    }

    /// Line-local failures skip the offending line; everything else aborts the
    /// pass before the cursor advances.
    pub fn is_line_local(&self) -> bool {
        matches!(self, Self::MalformedLine { .. })
    }
}
