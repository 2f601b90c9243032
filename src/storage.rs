use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Reads a JSON record, returning `None` when the file does not exist yet.
pub(crate) fn read_json_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw_json = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(Error::io_at("read", path, error)),
    };

    let record =
        serde_json::from_str::<T>(&raw_json).map_err(|error| Error::json_at("parse", path, error))?;

    Ok(Some(record))
}

/// Writes a JSON record through a temporary sibling file so readers never see
/// a half-written record.
pub(crate) fn write_json_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent_directory) = path.parent() {
        std::fs::create_dir_all(parent_directory)
            .map_err(|error| Error::io_at("create directory", parent_directory, error))?;
    }

    let temp_path = temporary_record_path(path);
    let serialized = serde_json::to_string_pretty(record)
        .map_err(|error| Error::json_at("serialize", path, error))?;

    std::fs::write(&temp_path, serialized)
        .map_err(|error| Error::io_at("write temporary record", &temp_path, error))?;

    if let Err(error) = std::fs::rename(&temp_path, path) {
        if let Err(cleanup_error) = std::fs::remove_file(&temp_path) {
            tracing::warn!(
                temp_path = %temp_path.display(),
                cleanup_error = %cleanup_error,
                "Failed to remove temporary record after rename failure"
            );
        }

        return Err(Error::io_at("finalize record", path, error));
    }

    Ok(())
}

fn temporary_record_path(path: &Path) -> PathBuf {
    let Some(file_name) = path.file_name().and_then(|value| value.to_str()) else {
        return path.with_extension("json.tmp");
    };

    path.with_file_name(format!("{file_name}.tmp"))
}
