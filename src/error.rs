//! Typed failures surfaced at the engine boundary
//!
//! Validation and not-found failures are returned synchronously to the
//! caller and never retried. Batch ingestion reports every per-file failure
//! through a single aggregate value instead of aborting on the first one.

use thiserror::Error;

/// Failures produced by the storage layer for a single operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The declared upload size exceeds the configured maximum. The stream
    /// body is never read when this fires.
    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    /// Content sniffing did not recognize an allowed image type.
    #[error("invalid image type")]
    InvalidType,

    #[error("image {filename} not found in album {album_id} of user {owner_id}")]
    ImageNotFound {
        owner_id: String,
        album_id: String,
        filename: String,
    },

    #[error("album {album_id} not found for user {owner_id}")]
    AlbumNotFound { owner_id: String, album_id: String },

    #[error("user {owner_id} not found")]
    UserNotFound { owner_id: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True for the not-found family, regardless of which entity was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ImageNotFound { .. }
                | StorageError::AlbumNotFound { .. }
                | StorageError::UserNotFound { .. }
        )
    }
}

/// A single failed file inside a batch upload.
#[derive(Debug, Error)]
#[error("file {index} ({filename}): {error}")]
pub struct FileFailure {
    /// Position of the file in the submitted batch.
    pub index: usize,
    /// Declared filename, kept for reporting only.
    pub filename: String,
    /// Pool worker that processed the file; `None` in sequential mode.
    pub worker: Option<usize>,
    #[source]
    pub error: StorageError,
}

/// Aggregate failure for a batch upload.
///
/// Files that saved before (or, in pooled mode, despite) the failures stay on
/// disk; there is no rollback. `failures` is ordered by batch index.
#[derive(Debug, Error)]
#[error("{} of {total} files failed to upload ({succeeded} saved)", .failures.len())]
pub struct UploadBatchError {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
}

/// Failures from the service-level upload entry point.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The target album could not be resolved or created; no file was
    /// attempted.
    #[error("failed to prepare album: {0}")]
    Album(#[source] StorageError),

    /// One or more files in the batch failed.
    #[error(transparent)]
    Batch(#[from] UploadBatchError),
}
