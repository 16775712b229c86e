//! Background retention sweep
//!
//! One long-lived tokio task walks the storage root on a fixed interval,
//! deletes files past the retention window, then prunes directories left
//! empty. Every per-entry failure is logged and skipped — the sweep has no
//! caller to surface errors to and never aborts over a single entry.

use log::{error, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::CleanupConfig;

/// A file is stale once its age strictly exceeds the retention window.
fn is_stale(modified: SystemTime, now: SystemTime, retention: Duration) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age > retention,
        // Modified in the future (clock skew): never stale.
        Err(_) => false,
    }
}

fn dir_is_empty(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Background retention sweeper
pub struct CleanupWorker {
    root: PathBuf,
    retention: Duration,
    interval: Duration,
}

impl CleanupWorker {
    pub fn new(root: impl Into<PathBuf>, config: &CleanupConfig) -> Self {
        Self {
            root: root.into(),
            retention: config.retention(),
            interval: config.sweep_interval(),
        }
    }

    /// Sweeper with explicit durations, mainly for tests.
    pub fn with_durations(root: impl Into<PathBuf>, retention: Duration, interval: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
            interval,
        }
    }

    /// Start the sweeper as a background task (non-blocking).
    ///
    /// The task blocks on whichever comes first: the next interval tick or
    /// the shutdown signal. The first sweep happens one full interval after
    /// startup. On shutdown the loop returns without starting a partial
    /// sweep and the timer is dropped with the task.
    pub fn start_background(self) -> CleanupHandle {
        info!(
            "Starting retention sweeper: interval {}s, retention {}s, root {}",
            self.interval.as_secs(),
            self.retention.as_secs(),
            self.root.display()
        );

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.sweep(),
                    _ = shutdown_rx.recv() => {
                        info!("Retention sweeper shutting down");
                        break;
                    }
                }
            }
        });

        CleanupHandle { shutdown_tx, task }
    }

    /// One full sweep: stale-file deletion, then empty-directory pruning.
    /// Both passes are best-effort and independent.
    pub fn sweep(&self) {
        if !self.root.exists() {
            return;
        }
        self.remove_stale_files();
        self.prune_empty_directories();
    }

    fn remove_stale_files(&self) {
        let users = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                error!("failed to scan storage root {}: {}", self.root.display(), e);
                return;
            }
        };

        for user in users.filter_map(|e| e.ok()) {
            if !user.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let user_dir = user.path();
            // Loose files directly under the owner directory age out too.
            self.sweep_dir(&user_dir);
            let albums = match fs::read_dir(&user_dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("failed to scan {}: {}", user_dir.display(), e);
                    continue;
                }
            };
            for album in albums.filter_map(|e| e.ok()) {
                if album.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    self.sweep_dir(&album.path());
                }
            }
        }
    }

    fn sweep_dir(&self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to scan {}: {}", dir.display(), e);
                return;
            }
        };
        let now = SystemTime::now();
        for entry in entries.filter_map(|e| e.ok()) {
            // Directories are handled by the pruning pass.
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            if !is_stale(modified, now, self.retention) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => info!("removed stale file {}", path.display()),
                Err(e) => error!("failed to remove stale file {}: {}", path.display(), e),
            }
        }
    }

    fn prune_empty_directories(&self) {
        let users = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                error!("failed to scan storage root {}: {}", self.root.display(), e);
                return;
            }
        };

        for user in users.filter_map(|e| e.ok()) {
            if !user.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let user_dir = user.path();
            if let Ok(albums) = fs::read_dir(&user_dir) {
                for album in albums.filter_map(|e| e.ok()) {
                    if !album.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                        continue;
                    }
                    Self::prune_if_empty(&album.path(), "album");
                }
            }
            // An owner emptied by album pruning above goes in the same sweep.
            Self::prune_if_empty(&user_dir, "user");
        }
    }

    fn prune_if_empty(dir: &Path, what: &str) {
        match dir_is_empty(dir) {
            Ok(true) => match fs::remove_dir(dir) {
                Ok(()) => info!("pruned empty {} directory {}", what, dir.display()),
                Err(e) => warn!("failed to prune {} directory {}: {}", what, dir.display(), e),
            },
            Ok(false) => {}
            Err(e) => warn!("failed to check {} directory {}: {}", what, dir.display(), e),
        }
    }
}

/// Handle for stopping a running sweeper.
///
/// Consuming the handle is the only way to stop the loop, so the
/// running-to-stopped transition can happen at most once.
pub struct CleanupHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal the sweeper to stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            error!("retention sweeper task failed: {}", e);
        }
    }
}
