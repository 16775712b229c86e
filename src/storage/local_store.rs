//! Directory-backed image store
//!
//! Layout: `<root>/<owner_id>/<album_id>/<filename>`. Users and albums are
//! nothing but directories; an album's creation time is its directory mtime
//! and counts come from scanning. Owner and album ids arrive pre-sanitized —
//! the session layer guarantees they are safe path segments.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::config::{StorageConfig, DEFAULT_MAX_FILE_SIZE};
use crate::error::StorageError;
use crate::ident;
use crate::storage::{AlbumInfo, ImageInfo, ImageStore, ImageStream};
use crate::validate;

/// Attempts at allocating an unused random name before the underlying
/// `AlreadyExists` error is surfaced. The id space is only 65536 values, so
/// collisions are expected and handled by regeneration.
const ID_ALLOC_ATTEMPTS: usize = 16;

fn resolve_root(config: Option<&StorageConfig>) -> PathBuf {
    // Try to get the storage root from configuration first
    if let Some(cfg) = config {
        let path = PathBuf::from(&cfg.root_path);
        if !path.exists() {
            fs::create_dir_all(&path).expect("Failed to create configured storage root");
        }
        info!("Using configured storage root: {}", path.display());
        return path;
    }

    // Try to get the storage root from environment variable
    match env::var("STORAGE_ROOT") {
        Ok(dir) => {
            info!("Using storage root from environment: {}", dir);
            let path = PathBuf::from(dir);
            if !path.exists() {
                fs::create_dir_all(&path).expect("Failed to create storage root");
            }
            path
        }
        Err(_) => {
            warn!("Storage root not defined in environment");
            let default_path = PathBuf::from(crate::config::DEFAULT_ROOT_PATH);
            if !default_path.exists() {
                fs::create_dir_all(&default_path).expect("Failed to create default storage root");
            }
            info!("Using default storage root: {}", default_path.display());
            default_path
        }
    }
}

/// Idempotent recursive directory creation.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    debug!("ensuring directory {}", path.display());
    fs::create_dir_all(path)
}

/// Directory-backed image store implementation
pub struct LocalDirectoryStore {
    root: PathBuf,
    max_file_size: u64,
    // Advisory only; see ImageStore::total_images.
    total_images: AtomicU64,
    // One lock per (owner, album), held across every mutation of that album
    // so a save racing an album delete cannot interleave.
    album_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl LocalDirectoryStore {
    pub fn new(config: Option<&StorageConfig>) -> Self {
        let root = resolve_root(config);
        let max_file_size = config
            .map(|cfg| cfg.max_file_size)
            .unwrap_or(DEFAULT_MAX_FILE_SIZE);
        Self {
            root,
            max_file_size,
            total_images: AtomicU64::new(0),
            album_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Store rooted at an explicit directory, mainly for tests.
    pub fn with_root(root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            root: root.into(),
            max_file_size,
            total_images: AtomicU64::new(0),
            album_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an owner's namespace. Pure derivation, no I/O.
    pub fn user_path(&self, owner_id: &str) -> PathBuf {
        self.root.join(owner_id)
    }

    /// Path of an album directory. Pure derivation, no I/O.
    pub fn album_path(&self, owner_id: &str, album_id: &str) -> PathBuf {
        self.root.join(owner_id).join(album_id)
    }

    /// Path of a stored image. Pure derivation, no I/O.
    pub fn image_path(&self, owner_id: &str, album_id: &str, filename: &str) -> PathBuf {
        self.root.join(owner_id).join(album_id).join(filename)
    }

    fn album_lock(&self, owner_id: &str, album_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.album_locks.lock().unwrap();
        locks
            .entry((owner_id.to_string(), album_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn drop_album_lock(&self, owner_id: &str, album_id: &str) {
        let mut locks = self.album_locks.lock().unwrap();
        locks.remove(&(owner_id.to_string(), album_id.to_string()));
    }

    fn drop_user_locks(&self, owner_id: &str) {
        let mut locks = self.album_locks.lock().unwrap();
        locks.retain(|(owner, _), _| owner != owner_id);
    }

    fn decrement_total(&self, n: u64) {
        let _ = self
            .total_images
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(n))
            });
    }

    /// Create a new image file under `album_dir` with a fresh random name.
    /// An existing file at the generated path counts as a collision and
    /// triggers regeneration; after the retry budget the underlying
    /// `AlreadyExists` error is surfaced rather than overwriting anything.
    fn create_image_file(
        &self,
        album_dir: &Path,
        extension: &str,
    ) -> Result<(String, PathBuf, File), StorageError> {
        let mut last_err: Option<io::Error> = None;
        for _ in 0..ID_ALLOC_ATTEMPTS {
            let filename = format!("{}.{}", ident::new_id(), extension);
            let path = album_dir.join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((filename, path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("filename collision on {}, regenerating", path.display());
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| io::Error::new(ErrorKind::AlreadyExists, "name space exhausted"))
            .into())
    }

    fn count_album_images(album_dir: &Path) -> usize {
        match fs::read_dir(album_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .filter(|e| validate::is_image_filename(&e.file_name().to_string_lossy()))
                .count(),
            Err(_) => 0,
        }
    }

    fn count_user_images(user_dir: &Path) -> usize {
        let entries = match fs::read_dir(user_dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let mut count = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            match entry.file_type() {
                Ok(t) if t.is_dir() => count += Self::count_album_images(&entry.path()),
                Ok(t) if t.is_file() => {
                    if validate::is_image_filename(&entry.file_name().to_string_lossy()) {
                        count += 1;
                    }
                }
                _ => {}
            }
        }
        count
    }
}

impl ImageStore for LocalDirectoryStore {
    fn save_image(
        &self,
        stream: &mut dyn ImageStream,
        declared_name: &str,
        size: u64,
        owner_id: &str,
        album_id: &str,
    ) -> Result<ImageInfo, StorageError> {
        if size > self.max_file_size {
            warn!(
                "rejecting {}: {} bytes exceeds limit {}",
                declared_name, size, self.max_file_size
            );
            return Err(StorageError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let kind = validate::classify(stream).ok_or_else(|| {
            warn!("rejecting {}: unrecognized content type", declared_name);
            StorageError::InvalidType
        })?;

        let lock = self.album_lock(owner_id, album_id);
        let _guard = lock.lock().unwrap();

        let album_dir = self.album_path(owner_id, album_id);
        ensure_dir(&album_dir)?;

        let (filename, path, mut dst) = self.create_image_file(&album_dir, kind.extension())?;
        io::copy(stream, &mut dst)?;

        // Stat the written file for the authoritative size.
        let meta = fs::metadata(&path)?;
        self.total_images.fetch_add(1, Ordering::Relaxed);

        info!(
            "saved {} as {} ({} bytes) into {}/{}",
            declared_name,
            filename,
            meta.len(),
            owner_id,
            album_id
        );

        Ok(ImageInfo {
            filename,
            path,
            size: meta.len(),
            owner_id: owner_id.to_string(),
            album_id: album_id.to_string(),
        })
    }

    fn create_album(&self, owner_id: &str) -> Result<String, StorageError> {
        ensure_dir(&self.user_path(owner_id))?;

        let mut last_err: Option<io::Error> = None;
        for _ in 0..ID_ALLOC_ATTEMPTS {
            let album_id = ident::new_id();
            let album_dir = self.album_path(owner_id, &album_id);
            match fs::create_dir(&album_dir) {
                Ok(()) => {
                    info!("created album {} for user {}", album_id, owner_id);
                    return Ok(album_id);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("album id collision on {}, regenerating", album_id);
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| io::Error::new(ErrorKind::AlreadyExists, "album space exhausted"))
            .into())
    }

    fn list_images(&self, owner_id: &str, album_id: &str) -> Result<Vec<ImageInfo>, StorageError> {
        let album_dir = self.album_path(owner_id, album_id);
        if !album_dir.exists() {
            return Ok(Vec::new());
        }

        let mut images: Vec<(SystemTime, ImageInfo)> = Vec::new();
        for entry in fs::read_dir(&album_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !validate::is_image_filename(&filename) {
                continue;
            }
            // Skip entries that vanish between readdir and stat.
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            images.push((
                modified,
                ImageInfo {
                    path: album_dir.join(&filename),
                    filename,
                    size: meta.len(),
                    owner_id: owner_id.to_string(),
                    album_id: album_id.to_string(),
                },
            ));
        }

        // Upload order: oldest first, filename as a deterministic tie-break.
        images.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.filename.cmp(&b.1.filename)));
        Ok(images.into_iter().map(|(_, info)| info).collect())
    }

    fn list_albums(&self, owner_id: &str) -> Result<Vec<AlbumInfo>, StorageError> {
        let user_dir = self.user_path(owner_id);
        if !user_dir.exists() {
            return Ok(Vec::new());
        }

        let mut albums = Vec::new();
        for entry in fs::read_dir(&user_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("skipping album {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let created_at =
                DateTime::<Utc>::from(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH));
            albums.push(AlbumInfo {
                image_count: Self::count_album_images(&entry.path()),
                id,
                owner_id: owner_id.to_string(),
                created_at,
            });
        }

        // Newest first; equal timestamps fall back to descending id so the
        // order is a deterministic total order.
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
        let lock = self.album_lock(owner_id, album_id);
        let _guard = lock.lock().unwrap();

        let path = self.image_path(owner_id, album_id, filename);
        if !path.is_file() {
            return Err(StorageError::ImageNotFound {
                owner_id: owner_id.to_string(),
                album_id: album_id.to_string(),
                filename: filename.to_string(),
            });
        }
        fs::remove_file(&path)?;
        self.decrement_total(1);
        info!("deleted image {}/{}/{}", owner_id, album_id, filename);
        Ok(())
    }

    fn delete_album(&self, owner_id: &str, album_id: &str) -> Result<(), StorageError> {
        let lock = self.album_lock(owner_id, album_id);
        {
            let _guard = lock.lock().unwrap();

            let album_dir = self.album_path(owner_id, album_id);
            if !album_dir.is_dir() {
                return Err(StorageError::AlbumNotFound {
                    owner_id: owner_id.to_string(),
                    album_id: album_id.to_string(),
                });
            }
            let count = Self::count_album_images(&album_dir) as u64;
            fs::remove_dir_all(&album_dir)?;
            self.decrement_total(count);
            info!(
                "deleted album {}/{} ({} images)",
                owner_id, album_id, count
            );
        }
        self.drop_album_lock(owner_id, album_id);
        Ok(())
    }

    fn delete_user(&self, owner_id: &str) -> Result<(), StorageError> {
        let user_dir = self.user_path(owner_id);
        if !user_dir.is_dir() {
            return Err(StorageError::UserNotFound {
                owner_id: owner_id.to_string(),
            });
        }
        let count = Self::count_user_images(&user_dir) as u64;
        fs::remove_dir_all(&user_dir)?;
        self.decrement_total(count);
        self.drop_user_locks(owner_id);
        info!("deleted user {} ({} images)", owner_id, count);
        Ok(())
    }

    fn total_images(&self) -> u64 {
        self.total_images.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    fn store(dir: &tempfile::TempDir) -> LocalDirectoryStore {
        LocalDirectoryStore::with_root(dir.path(), DEFAULT_MAX_FILE_SIZE)
    }

    #[test]
    fn test_path_derivation_is_pure_join() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_eq!(store.user_path("u1"), dir.path().join("u1"));
        assert_eq!(store.album_path("u1", "a1"), dir.path().join("u1").join("a1"));
        assert_eq!(
            store.image_path("u1", "a1", "beef.png"),
            dir.path().join("u1").join("a1").join("beef.png")
        );
        // No directory was created as a side effect.
        assert!(!store.user_path("u1").exists());
    }

    #[test]
    fn test_save_image_writes_file_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let data = png_bytes();

        let info = store
            .save_image(
                &mut Cursor::new(data.clone()),
                "upload.png",
                data.len() as u64,
                "u1",
                "a1",
            )
            .unwrap();

        assert_eq!(info.size, data.len() as u64);
        assert!(info.filename.ends_with(".png"));
        assert_eq!(info.filename.len(), "abcd.png".len());
        assert!(info.path.is_file());
        assert_eq!(fs::read(&info.path).unwrap(), data);
        assert_eq!(store.total_images(), 1);
    }

    #[test]
    fn test_save_image_rejects_oversized_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirectoryStore::with_root(dir.path(), 16);

        // The stream would fail any read; the size gate must fire first.
        struct Unreadable;
        impl std::io::Read for Unreadable {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                panic!("body must not be read for an oversized upload");
            }
        }
        impl std::io::Seek for Unreadable {
            fn seek(&mut self, _pos: std::io::SeekFrom) -> io::Result<u64> {
                panic!("body must not be touched for an oversized upload");
            }
        }

        let err = store
            .save_image(&mut Unreadable, "big.png", 17, "u1", "a1")
            .unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { size: 17, limit: 16 }));
        assert!(store.list_images("u1", "a1").unwrap().is_empty());
    }

    #[test]
    fn test_save_image_rejects_unrecognized_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let data = b"definitely not an image".to_vec();

        let err = store
            .save_image(
                &mut Cursor::new(data.clone()),
                "fake.png",
                data.len() as u64,
                "u1",
                "a1",
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidType));
        // No file and no album directory were created.
        assert!(!store.album_path("u1", "a1").exists());
        assert_eq!(store.total_images(), 0);
    }

    #[test]
    fn test_list_images_missing_album_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.list_images("ghost", "none").unwrap().is_empty());
    }

    #[test]
    fn test_list_images_filters_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let album = dir.path().join("u1").join("a1");
        fs::create_dir_all(&album).unwrap();
        fs::write(album.join("beef.png"), png_bytes()).unwrap();
        fs::write(album.join("notes.txt"), b"scratch").unwrap();
        fs::create_dir(album.join("nested")).unwrap();

        let images = store.list_images("u1", "a1").unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].filename, "beef.png");
        assert_eq!(images[0].size, png_bytes().len() as u64);
    }

    #[test]
    fn test_list_albums_order_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let album = store.create_album("u1").unwrap();
        let data = png_bytes();
        store
            .save_image(
                &mut Cursor::new(data.clone()),
                "a.png",
                data.len() as u64,
                "u1",
                &album,
            )
            .unwrap();
        let empty = store.create_album("u1").unwrap();

        let albums = store.list_albums("u1").unwrap();
        assert_eq!(albums.len(), 2);
        let with_image = albums.iter().find(|a| a.id == album).unwrap();
        assert_eq!(with_image.image_count, 1);
        let without = albums.iter().find(|a| a.id == empty).unwrap();
        assert_eq!(without.image_count, 0);

        // Deterministic: created_at descending, id descending on ties.
        let mut resorted = albums.clone();
        resorted.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        assert_eq!(resorted, albums);
    }

    #[test]
    fn test_list_albums_missing_user_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.list_albums("ghost").unwrap().is_empty());
    }

    #[test]
    fn test_delete_image_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let data = png_bytes();
        let info = store
            .save_image(
                &mut Cursor::new(data.clone()),
                "a.png",
                data.len() as u64,
                "u1",
                "a1",
            )
            .unwrap();

        store.delete_image("u1", "a1", &info.filename).unwrap();
        assert_eq!(store.total_images(), 0);
        assert!(store.list_images("u1", "a1").unwrap().is_empty());

        let err = store.delete_image("u1", "a1", &info.filename).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_album_removes_tree_and_decrements() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let data = png_bytes();
        for name in ["a.png", "b.png", "c.png"] {
            store
                .save_image(
                    &mut Cursor::new(data.clone()),
                    name,
                    data.len() as u64,
                    "u1",
                    "a1",
                )
                .unwrap();
        }
        assert_eq!(store.total_images(), 3);

        store.delete_album("u1", "a1").unwrap();
        assert_eq!(store.total_images(), 0);
        assert!(store.list_images("u1", "a1").unwrap().is_empty());
        assert!(!store.album_path("u1", "a1").exists());

        assert!(store.delete_album("u1", "a1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_user_removes_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let data = png_bytes();
        let a1 = store.create_album("u1").unwrap();
        let a2 = store.create_album("u1").unwrap();
        for album in [&a1, &a2] {
            store
                .save_image(
                    &mut Cursor::new(data.clone()),
                    "x.png",
                    data.len() as u64,
                    "u1",
                    album,
                )
                .unwrap();
        }
        assert_eq!(store.total_images(), 2);

        store.delete_user("u1").unwrap();
        assert_eq!(store.total_images(), 0);
        assert!(!store.user_path("u1").exists());
        assert!(store.delete_user("u1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_extension_follows_sniffed_type_not_declared_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.extend_from_slice(&[0u8; 32]);

        // Declared as .png, sniffed as JPEG: stored extension must be jpg.
        let info = store
            .save_image(
                &mut Cursor::new(data.clone()),
                "liar.png",
                data.len() as u64,
                "u1",
                "a1",
            )
            .unwrap();
        assert!(info.filename.ends_with(".jpg"));
    }

    #[test]
    fn test_advisory_counter_saturates_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        // A delete of files the counter never saw must not underflow.
        let album = dir.path().join("u1").join("a1");
        fs::create_dir_all(&album).unwrap();
        fs::write(album.join("feed.png"), png_bytes()).unwrap();

        store.delete_album("u1", "a1").unwrap();
        assert_eq!(store.total_images(), 0);
    }
}
