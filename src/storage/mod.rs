//! Image Storage Layer Abstraction
//!
//! This module provides an abstraction over image storage backends. The
//! production backend keeps everything in a directory tree — the filesystem
//! itself is the catalog, there is no separate index — while the mock
//! backend keeps the same semantics in memory for tests.

pub mod local_store;
pub mod mock_store;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek};
use std::path::PathBuf;

use crate::error::StorageError;

/// Owner identifier type
pub type OwnerId = String;

/// Album identifier type
pub type AlbumId = String;

/// Stream type accepted for uploads. The validation gate reads the head and
/// rewinds before the body is copied out, so plain `Read` is not enough.
pub trait ImageStream: Read + Seek {}

impl<T: Read + Seek> ImageStream for T {}

/// A stored image, described from filesystem state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Generated name, `<4 hex chars>.<ext>`
    pub filename: String,
    /// Full path of the stored file
    pub path: PathBuf,
    /// Size in bytes, from stat after the write
    pub size: u64,
    pub owner_id: String,
    pub album_id: String,
}

/// An album, described from filesystem state. Creation time is the album
/// directory's modification time and the image count comes from a scan —
/// neither is stored anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub image_count: usize,
}

/// Trait defining the image storage interface
pub trait ImageStore: Send + Sync {
    /// Validate and persist one uploaded stream into an album.
    ///
    /// Fails with [`StorageError::TooLarge`] before reading the body when the
    /// declared size exceeds the configured maximum, and with
    /// [`StorageError::InvalidType`] when content sniffing rejects the
    /// stream. The declared name is used for reporting only.
    fn save_image(
        &self,
        stream: &mut dyn ImageStream,
        declared_name: &str,
        size: u64,
        owner_id: &str,
        album_id: &str,
    ) -> Result<ImageInfo, StorageError>;

    /// Allocate a fresh album for an owner and return its id.
    fn create_album(&self, owner_id: &str) -> Result<AlbumId, StorageError>;

    /// List an album's images sorted by upload time, oldest first. A missing
    /// album yields an empty list, not an error. The result is recomputed
    /// from backend state on every call.
    fn list_images(&self, owner_id: &str, album_id: &str) -> Result<Vec<ImageInfo>, StorageError>;

    /// List an owner's albums, newest first, ties broken by descending id.
    /// A missing owner yields an empty list.
    fn list_albums(&self, owner_id: &str) -> Result<Vec<AlbumInfo>, StorageError>;

    fn delete_image(
        &self,
        owner_id: &str,
        album_id: &str,
        filename: &str,
    ) -> Result<(), StorageError>;

    /// Remove an album and everything in it.
    fn delete_album(&self, owner_id: &str, album_id: &str) -> Result<(), StorageError>;

    /// Remove an owner's entire namespace.
    fn delete_user(&self, owner_id: &str) -> Result<(), StorageError>;

    /// Advisory count of images stored through this instance. Updated
    /// atomically on create/delete but never reconciled against backend
    /// state, so it can drift from what a scan would find (deletions by the
    /// sweeper, files present before startup). Do not rely on it for
    /// correctness; scan via the list operations instead.
    fn total_images(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_info_serialization() {
        let info = ImageInfo {
            filename: "a1b2.png".to_string(),
            path: PathBuf::from("/data/owner/album/a1b2.png"),
            size: 42,
            owner_id: "owner".to_string(),
            album_id: "album".to_string(),
        };

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["filename"], "a1b2.png");
        assert_eq!(value["size"], 42);
        assert_eq!(value["owner_id"], "owner");
    }

    #[test]
    fn test_album_info_serialization_roundtrip() {
        let album = AlbumInfo {
            id: "c3d4".to_string(),
            owner_id: "owner".to_string(),
            created_at: Utc::now(),
            image_count: 3,
        };

        let json = serde_json::to_string(&album).unwrap();
        let back: AlbumInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, album);
    }
}
