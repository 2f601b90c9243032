use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::{read_json_record, write_json_record};

pub const CURSOR_FILE_NAME: &str = "logInfo.json";

/// How far the game log has been consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogCursor {
    /// First content line of the log; a different value means a new session.
    pub epoch_marker: String,
    pub file_size_bytes: u64,
    pub last_processed_line_index: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<DateTime<Utc>>,
    pub session_detected: bool,
}

impl LogCursor {
    /// Cursor for a freshly detected session: nothing consumed yet.
    pub fn rotated(
        epoch_marker: String,
        file_size_bytes: u64,
        last_modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            epoch_marker,
            file_size_bytes,
            last_processed_line_index: 0,
            last_modified_at,
            session_detected: true,
        }
    }

    /// Same session, index moved past `line_index`.
    pub fn advanced_past(
        &self,
        line_index: u64,
        file_size_bytes: u64,
        last_modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            epoch_marker: self.epoch_marker.clone(),
            file_size_bytes,
            last_processed_line_index: self.last_processed_line_index.max(line_index + 1),
            last_modified_at,
            session_detected: true,
        }
    }
}

pub trait CursorStore: Send + Sync {
    /// Never fails: unreadable or missing state yields a zero-valued cursor.
    fn load(&self) -> LogCursor;

    fn save(&self, cursor: &LogCursor) -> Result<()>;
}

pub struct JsonCursorStore {
    path: PathBuf,
}

impl JsonCursorStore {
    pub fn new(data_directory: &Path) -> Self {
        Self {
            path: data_directory.join(CURSOR_FILE_NAME),
        }
    }
}

impl CursorStore for JsonCursorStore {
    fn load(&self) -> LogCursor {
        match read_json_record::<LogCursor>(&self.path) {
            Ok(cursor) => cursor.unwrap_or_default(),
            Err(error) => {
                tracing::warn!(
                    cursor_path = %self.path.display(),
                    cursor_error = %error,
                    "Failed to load log cursor, starting from an empty cursor"
                );
                LogCursor::default()
            }
        }
    }

    fn save(&self, cursor: &LogCursor) -> Result<()> {
        write_json_record(&self.path, cursor).map_err(|error| Error::Persist {
            target: "log cursor",
            reason: error.to_string(),
        })
    }
}
