//! Application State Management
//!
//! This module provides the engine state that contains all services and
//! their dependencies, following the dependency injection pattern.

use log::info;
use std::sync::Arc;

use crate::config::{AppConfig, StorageBackend};
use crate::service::cleanup_worker::{CleanupHandle, CleanupWorker};
use crate::service::MediaService;
use crate::storage::local_store::LocalDirectoryStore;
use crate::storage::mock_store::MockImageStore;
use crate::storage::ImageStore;

/// Engine state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub media_service: Arc<MediaService>,
    pub store: Arc<dyn ImageStore>,
    pub config: AppConfig,
}

impl AppState {
    /// Create engine state with services configured from the YAML config
    pub fn new() -> Self {
        let config = AppConfig::load().expect("Failed to load configuration");
        Self::from_config(config)
    }

    /// Create engine state from configuration
    pub fn from_config(config: AppConfig) -> Self {
        info!("Initializing engine state with configuration");

        let store: Arc<dyn ImageStore> = match config.storage.backend {
            StorageBackend::Directory => {
                info!(
                    "Using directory image store with root {}",
                    config.storage.root_path
                );
                Arc::new(LocalDirectoryStore::new(Some(&config.storage)))
            }
            StorageBackend::Mock => {
                info!("Using mock image store");
                Arc::new(MockImageStore::with_max_file_size(
                    config.storage.max_file_size,
                ))
            }
        };

        let media_service = Arc::new(MediaService::new(Arc::clone(&store), &config.upload));

        info!("Engine state initialized successfully");
        Self {
            media_service,
            store,
            config,
        }
    }

    /// Create engine state for testing with the mock backend
    pub fn new_for_testing() -> Self {
        let config = AppConfig::default();
        let store: Arc<dyn ImageStore> = Arc::new(MockImageStore::new());
        let media_service = Arc::new(MediaService::new(Arc::clone(&store), &config.upload));
        Self {
            media_service,
            store,
            config,
        }
    }

    /// Start the retention sweeper from the configuration. Returns `None`
    /// when the sweeper is disabled; otherwise the handle the host process
    /// uses to stop it exactly once at shutdown.
    pub fn start_cleanup(&self) -> Option<CleanupHandle> {
        if !self.config.cleanup.enabled {
            info!("Retention sweeper disabled by configuration");
            return None;
        }
        let worker = CleanupWorker::new(&self.config.storage.root_path, &self.config.cleanup);
        Some(worker.start_background())
    }
}
