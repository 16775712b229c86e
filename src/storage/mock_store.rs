//! Mock implementation of ImageStore for testing
//!
//! Keeps the directory store's semantics — validation, generated names,
//! not-found behavior, the advisory counter — in memory. Insertion order
//! stands in for modification-time order.

use chrono::{DateTime, Utc};
use log::info;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::error::StorageError;
use crate::ident;
use crate::storage::{AlbumInfo, ImageInfo, ImageStore, ImageStream};
use crate::validate;

struct MockImage {
    filename: String,
    data: Vec<u8>,
}

struct MockAlbum {
    created_at: DateTime<Utc>,
    images: Vec<MockImage>,
}

/// Mock implementation of ImageStore for testing
pub struct MockImageStore {
    // In-memory catalog: owner_id -> album_id -> album
    data: Mutex<HashMap<String, HashMap<String, MockAlbum>>>,
    max_file_size: u64,
    total_images: AtomicU64,
}

impl MockImageStore {
    pub fn new() -> Self {
        Self::with_max_file_size(DEFAULT_MAX_FILE_SIZE)
    }

    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            max_file_size,
            total_images: AtomicU64::new(0),
        }
    }

    /// Get the number of owners in the store
    pub fn user_count(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Get the number of images in a specific album
    pub fn image_count(&self, owner_id: &str, album_id: &str) -> usize {
        let data = self.data.lock().unwrap();
        data.get(owner_id)
            .and_then(|albums| albums.get(album_id))
            .map(|album| album.images.len())
            .unwrap_or(0)
    }

    /// Check if an owner exists in the store
    pub fn user_exists(&self, owner_id: &str) -> bool {
        self.data.lock().unwrap().contains_key(owner_id)
    }

    /// Check if an album exists for an owner
    pub fn album_exists(&self, owner_id: &str, album_id: &str) -> bool {
        let data = self.data.lock().unwrap();
        data.get(owner_id)
            .map(|albums| albums.contains_key(album_id))
            .unwrap_or(false)
    }

    /// Clear all data from the store
    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
        self.total_images.store(0, Ordering::Relaxed);
    }

    fn mock_path(owner_id: &str, album_id: &str, filename: &str) -> PathBuf {
        ["mock", owner_id, album_id, filename].iter().collect()
    }

    fn decrement_total(&self, n: u64) {
        let _ = self
            .total_images
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(n))
            });
    }
}

impl Default for MockImageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageStore for MockImageStore {
    fn save_image(
        &self,
        stream: &mut dyn ImageStream,
        declared_name: &str,
        size: u64,
        owner_id: &str,
        album_id: &str,
    ) -> Result<ImageInfo, StorageError> {
        if size > self.max_file_size {
            return Err(StorageError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        let kind = validate::classify(stream).ok_or(StorageError::InvalidType)?;

        let mut body = Vec::new();
        stream.read_to_end(&mut body)?;

        let mut data = self.data.lock().unwrap();
        let albums = data.entry(owner_id.to_string()).or_default();
        let album = albums.entry(album_id.to_string()).or_insert_with(|| MockAlbum {
            created_at: Utc::now(),
            images: Vec::new(),
        });

        // Same collision rule as the directory store: regenerate on an
        // already-used name.
        let mut filename = format!("{}.{}", ident::new_id(), kind.extension());
        while album.images.iter().any(|img| img.filename == filename) {
            filename = format!("{}.{}", ident::new_id(), kind.extension());
        }

        let stored_size = body.len() as u64;
        album.images.push(MockImage {
            filename: filename.clone(),
            data: body,
        });
        self.total_images.fetch_add(1, Ordering::Relaxed);

        info!(
            "Mock: saved {} as {} ({} bytes) into {}/{}",
            declared_name, filename, stored_size, owner_id, album_id
        );

        Ok(ImageInfo {
            path: Self::mock_path(owner_id, album_id, &filename),
            filename,
            size: stored_size,
            owner_id: owner_id.to_string(),
            album_id: album_id.to_string(),
        })
    }

    fn create_album(&self, owner_id: &str) -> Result<String, StorageError> {
        let mut data = self.data.lock().unwrap();
        let albums = data.entry(owner_id.to_string()).or_default();

        let mut album_id = ident::new_id();
        while albums.contains_key(&album_id) {
            album_id = ident::new_id();
        }
        albums.insert(
            album_id.clone(),
            MockAlbum {
                created_at: Utc::now(),
                images: Vec::new(),
            },
        );
        Ok(album_id)
    }

    fn list_images(&self, owner_id: &str, album_id: &str) -> Result<Vec<ImageInfo>, StorageError> {
        let data = self.data.lock().unwrap();
        let images = data
            .get(owner_id)
            .and_then(|albums| albums.get(album_id))
            .map(|album| {
                album
                    .images
                    .iter()
                    .map(|img| ImageInfo {
                        filename: img.filename.clone(),
                        path: Self::mock_path(owner_id, album_id, &img.filename),
                        size: img.data.len() as u64,
                        owner_id: owner_id.to_string(),
                        album_id: album_id.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(images)
    }

    fn list_albums(&self, owner_id: &str) -> Result<Vec<AlbumInfo>, StorageError> {
        let data = self.data.lock().unwrap();
        let mut albums: Vec<AlbumInfo> = data
            .get(owner_id)
            .map(|albums| {
                albums
                    .iter()
                    .map(|(id, album)| AlbumInfo {
                        id: id.clone(),
                        owner_id: owner_id.to_string(),
                        created_at: album.created_at,
                        image_count: album.images.len(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        albums.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(albums)
    }

    fn delete_image(
        &self,
        owner_id: &str,
        album_id: &str,
        filename: &str,
    ) -> Result<(), StorageError> {
        let mut data = self.data.lock().unwrap();
        let album = data
            .get_mut(owner_id)
            .and_then(|albums| albums.get_mut(album_id));
        let Some(album) = album else {
            return Err(StorageError::ImageNotFound {
                owner_id: owner_id.to_string(),
                album_id: album_id.to_string(),
                filename: filename.to_string(),
            });
        };
        let before = album.images.len();
        album.images.retain(|img| img.filename != filename);
        if album.images.len() == before {
            return Err(StorageError::ImageNotFound {
                owner_id: owner_id.to_string(),
                album_id: album_id.to_string(),
                filename: filename.to_string(),
            });
        }
        self.decrement_total(1);
        Ok(())
    }

    fn delete_album(&self, owner_id: &str, album_id: &str) -> Result<(), StorageError> {
        let mut data = self.data.lock().unwrap();
        let removed = data
            .get_mut(owner_id)
            .and_then(|albums| albums.remove(album_id));
        match removed {
            Some(album) => {
                self.decrement_total(album.images.len() as u64);
                Ok(())
            }
            None => Err(StorageError::AlbumNotFound {
                owner_id: owner_id.to_string(),
                album_id: album_id.to_string(),
            }),
        }
    }

    fn delete_user(&self, owner_id: &str) -> Result<(), StorageError> {
        let mut data = self.data.lock().unwrap();
        match data.remove(owner_id) {
            Some(albums) => {
                let count: usize = albums.values().map(|a| a.images.len()).sum();
                self.decrement_total(count as u64);
                Ok(())
            }
            None => Err(StorageError::UserNotFound {
                owner_id: owner_id.to_string(),
            }),
        }
    }

    fn total_images(&self) -> u64 {
        self.total_images.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn gif_bytes() -> Vec<u8> {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&[0u8; 16]);
        data
    }

    #[test]
    fn test_mock_store_basic_operations() {
        let store = MockImageStore::new();
        assert_eq!(store.user_count(), 0);
        assert!(!store.user_exists("u1"));

        let data = gif_bytes();
        let info = store
            .save_image(
                &mut Cursor::new(data.clone()),
                "anim.gif",
                data.len() as u64,
                "u1",
                "a1",
            )
            .unwrap();
        assert!(info.filename.ends_with(".gif"));
        assert_eq!(info.size, data.len() as u64);
        assert!(store.user_exists("u1"));
        assert!(store.album_exists("u1", "a1"));
        assert_eq!(store.image_count("u1", "a1"), 1);
        assert_eq!(store.total_images(), 1);

        store.delete_image("u1", "a1", &info.filename).unwrap();
        assert_eq!(store.image_count("u1", "a1"), 0);
        assert_eq!(store.total_images(), 0);
    }

    #[test]
    fn test_mock_store_validation_matches_directory_semantics() {
        let store = MockImageStore::with_max_file_size(8);
        let data = gif_bytes();

        let err = store
            .save_image(
                &mut Cursor::new(data.clone()),
                "anim.gif",
                data.len() as u64,
                "u1",
                "a1",
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { .. }));

        let store = MockImageStore::new();
        let err = store
            .save_image(&mut Cursor::new(b"nope".to_vec()), "x.gif", 4, "u1", "a1")
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidType));
        assert!(!store.album_exists("u1", "a1"));
    }

    #[test]
    fn test_mock_store_error_cases() {
        let store = MockImageStore::new();
        assert!(store.delete_image("u", "a", "f.png").unwrap_err().is_not_found());
        assert!(store.delete_album("u", "a").unwrap_err().is_not_found());
        assert!(store.delete_user("u").unwrap_err().is_not_found());
        assert!(store.list_images("u", "a").unwrap().is_empty());
        assert!(store.list_albums("u").unwrap().is_empty());
    }

    #[test]
    fn test_mock_store_list_order_is_insertion_order() {
        let store = MockImageStore::new();
        let data = gif_bytes();
        let mut names = Vec::new();
        for _ in 0..4 {
            let info = store
                .save_image(
                    &mut Cursor::new(data.clone()),
                    "x.gif",
                    data.len() as u64,
                    "u1",
                    "a1",
                )
                .unwrap();
            names.push(info.filename);
        }
        let listed: Vec<String> = store
            .list_images("u1", "a1")
            .unwrap()
            .into_iter()
            .map(|i| i.filename)
            .collect();
        assert_eq!(listed, names);
    }

    #[test]
    fn test_mock_store_delete_user_clears_everything() {
        let store = MockImageStore::new();
        let data = gif_bytes();
        let a1 = store.create_album("u1").unwrap();
        let a2 = store.create_album("u1").unwrap();
        assert_ne!(a1, a2);
        for album in [&a1, &a2] {
            store
                .save_image(
                    &mut Cursor::new(data.clone()),
                    "x.gif",
                    data.len() as u64,
                    "u1",
                    album,
                )
                .unwrap();
        }
        assert_eq!(store.total_images(), 2);

        store.delete_user("u1").unwrap();
        assert_eq!(store.user_count(), 0);
        assert_eq!(store.total_images(), 0);
    }
}
