//! Application Configuration
//!
//! This module provides configuration management for the engine, supporting
//! YAML configuration files with sensible defaults.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default storage root when neither configuration nor environment name one.
pub const DEFAULT_ROOT_PATH: &str = "./data";
/// Maximum accepted upload size in bytes (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Batches at most this large are ingested sequentially.
pub const DEFAULT_SEQUENTIAL_LIMIT: usize = 5;
/// Worker pool size for larger batches.
pub const DEFAULT_MAX_WORKERS: usize = 4;
/// Retention window in seconds (60 days).
pub const DEFAULT_RETENTION_SECS: u64 = 60 * 24 * 60 * 60;
/// Sweep interval in seconds (24 hours).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Image store backend types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StorageBackend {
    Directory,
    Mock,
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::Directory
    }
}

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage configuration
    pub storage: StorageConfig,
    /// Upload pipeline configuration
    pub upload: UploadConfig,
    /// Retention sweeper configuration
    pub cleanup: CleanupConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Root directory holding the `<owner>/<album>/<image>` tree
    pub root_path: String,
    /// Maximum accepted upload size in bytes
    pub max_file_size: u64,
}

/// Upload pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Batches up to this many files run sequentially and fail fast
    pub sequential_limit: usize,
    /// Worker pool size for batches above the sequential limit
    pub max_workers: usize,
}

/// Retention sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Enable the background sweeper
    pub enabled: bool,
    /// Age in seconds past which a stored file is deleted
    pub retention_secs: u64,
    /// Seconds between sweeps
    pub sweep_interval_secs: u64,
}

impl CleanupConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root_path: DEFAULT_ROOT_PATH.to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            sequential_limit: DEFAULT_SEQUENTIAL_LIMIT,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_secs: DEFAULT_RETENTION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            upload: UploadConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config.yaml`, use defaults if not found
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(Path::new("config.yaml"))
    }

    /// Load configuration from an explicit file path, use defaults if the
    /// file does not exist
    pub fn load_from(config_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            warn!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}
