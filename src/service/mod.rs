//! Service layer over the storage abstraction
//!
//! The media service is what the HTTP collaborator talks to: it resolves the
//! target album, runs batches through the pipeline, and slices listings into
//! pages. All methods are synchronous and may block on file I/O.

pub mod cleanup_worker;
pub mod owner_context;
pub mod upload_pipeline;

use log::{debug, info};
use std::io::{Read, Seek};
use std::sync::Arc;

use crate::config::UploadConfig;
use crate::error::{StorageError, UploadError};
use crate::pagination;
use crate::service::owner_context::OwnerContext;
use crate::service::upload_pipeline::{UploadFile, UploadPipeline};
use crate::storage::{AlbumInfo, ImageInfo, ImageStore};

/// Outcome of a batch upload: the album actually written to (freshly
/// allocated when the context named none) and how many files were saved.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub album_id: String,
    pub uploaded: usize,
}

/// Media service that provides a clean interface to the storage abstraction
pub struct MediaService {
    store: Arc<dyn ImageStore>,
    pipeline: UploadPipeline,
}

impl MediaService {
    /// Create a new media service with an injected storage backend
    pub fn new(store: Arc<dyn ImageStore>, config: &UploadConfig) -> Self {
        let pipeline = UploadPipeline::new(Arc::clone(&store), config);
        Self { store, pipeline }
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    /// Resolve the album an upload targets, allocating a fresh one when the
    /// context does not name any.
    pub fn resolve_album(&self, context: &OwnerContext) -> Result<String, StorageError> {
        match &context.album_id {
            Some(album_id) => Ok(album_id.clone()),
            None => {
                let album_id = self.store.create_album(&context.owner_id)?;
                debug!(
                    "allocated album {} for user {}",
                    album_id, context.owner_id
                );
                Ok(album_id)
            }
        }
    }

    /// Save a single uploaded stream into the context's album.
    pub fn save_image<S: Read + Seek>(
        &self,
        context: &OwnerContext,
        stream: &mut S,
        declared_name: &str,
        size: u64,
    ) -> Result<ImageInfo, StorageError> {
        let album_id = self.resolve_album(context)?;
        self.store
            .save_image(stream, declared_name, size, &context.owner_id, &album_id)
    }

    /// Ingest a batch of files into the context's album.
    ///
    /// Batches of at most five files run sequentially and stop at the first
    /// failure; larger batches run on the bounded worker pool and always
    /// complete, aggregating every per-file failure. Saved files are never
    /// rolled back either way.
    pub fn upload_batch<S: Read + Seek + Send>(
        &self,
        context: &OwnerContext,
        files: Vec<UploadFile<S>>,
    ) -> Result<BatchOutcome, UploadError> {
        let album_id = self.resolve_album(context).map_err(UploadError::Album)?;
        let uploaded = self
            .pipeline
            .upload(files, &context.owner_id, &album_id)?;
        info!(
            "batch upload for user {}: {} files into album {}",
            context.owner_id, uploaded, album_id
        );
        Ok(BatchOutcome { album_id, uploaded })
    }

    /// All images of an album, oldest first. Missing albums list as empty.
    pub fn list_images(
        &self,
        owner_id: &str,
        album_id: &str,
    ) -> Result<Vec<ImageInfo>, StorageError> {
        self.store.list_images(owner_id, album_id)
    }

    /// One page of an album's images. A `page_size` of zero disables
    /// pagination; an out-of-range page is empty, not an error. The page
    /// index is not clamped here — see [`pagination::page_count`].
    pub fn list_images_page(
        &self,
        owner_id: &str,
        album_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<ImageInfo>, StorageError> {
        let images = self.store.list_images(owner_id, album_id)?;
        Ok(pagination::paginate(&images, page, page_size).to_vec())
    }

    /// Number of pages an album currently spans at `page_size`.
    pub fn image_page_count(
        &self,
        owner_id: &str,
        album_id: &str,
        page_size: usize,
    ) -> Result<usize, StorageError> {
        let images = self.store.list_images(owner_id, album_id)?;
        Ok(pagination::page_count(images.len(), page_size))
    }

    /// All albums of an owner, newest first.
    pub fn list_albums(&self, owner_id: &str) -> Result<Vec<AlbumInfo>, StorageError> {
        self.store.list_albums(owner_id)
    }

    pub fn delete_image(
        &self,
        owner_id: &str,
        album_id: &str,
        filename: &str,
    ) -> Result<(), StorageError> {
        self.store.delete_image(owner_id, album_id, filename)
    }

    pub fn delete_album(&self, owner_id: &str, album_id: &str) -> Result<(), StorageError> {
        self.store.delete_album(owner_id, album_id)
    }

    pub fn delete_user(&self, owner_id: &str) -> Result<(), StorageError> {
        self.store.delete_user(owner_id)
    }

    /// Advisory total of stored images; see [`ImageStore::total_images`].
    pub fn total_images(&self) -> u64 {
        self.store.total_images()
    }
}
