use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid user namespace: {0:?}")]
    InvalidNamespace(String),

    #[error("Path is outside the storage root: {0}")]
    OutsideRoot(String),

    #[error("Failed to persist file: {0}")]
    PersistError(String),

    #[error("Background file task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A file placed at its content address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredFile {
    pub sha256: String,
    pub path: String,
    pub user_id: String,
    pub size_bytes: u64,
}

/// Outcome of storing an upload. `deduplicated` is set when identical
/// content already existed in the user's namespace and was reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub file: StoredFile,
    pub original_filename: String,
    pub deduplicated: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileDescription {
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub size_human: String,
    pub modified_at: Option<DateTime<Utc>>,
}

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

#[allow(clippy::cast_precision_loss)]
pub fn human_readable_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = SIZE_UNITS[0];
    for next in SIZE_UNITS.iter().skip(1) {
        if size < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }
    format!("{size:.1} {unit}")
}
