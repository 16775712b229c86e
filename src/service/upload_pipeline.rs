//! Batch ingestion pipeline
//!
//! Small batches are written one at a time and stop at the first failure.
//! Larger batches fan out to a bounded pool of workers that pull jobs from a
//! shared queue and always run the batch to completion, collecting every
//! per-file failure into one aggregate. The two modes deliberately differ in
//! failure isolation; callers and tests treat them as distinct behaviors.
//! In either mode, files saved before a failure stay on disk — there is no
//! rollback and no cancelling a batch once its workers have started.

use log::{info, warn};
use std::collections::VecDeque;
use std::io::{Read, Seek};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::UploadConfig;
use crate::error::{FileFailure, UploadBatchError};
use crate::storage::ImageStore;

/// One file of an upload batch: the seekable stream, the client's declared
/// name (reporting only) and the declared size in bytes.
pub struct UploadFile<S> {
    pub stream: S,
    pub name: String,
    pub size: u64,
}

impl<S> UploadFile<S> {
    pub fn new(stream: S, name: impl Into<String>, size: u64) -> Self {
        Self {
            stream,
            name: name.into(),
            size,
        }
    }
}

/// Batch ingestion over an [`ImageStore`].
pub struct UploadPipeline {
    store: Arc<dyn ImageStore>,
    sequential_limit: usize,
    max_workers: usize,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn ImageStore>, config: &UploadConfig) -> Self {
        Self {
            store,
            sequential_limit: config.sequential_limit,
            max_workers: config.max_workers.max(1),
        }
    }

    /// Ingest a batch into `owner_id`/`album_id`, returning the number of
    /// files saved.
    ///
    /// Batches of at most `sequential_limit` files run sequentially and fail
    /// fast: the first error aborts the rest of the batch, and the aggregate
    /// carries that single failure. Larger batches run on the worker pool,
    /// never abort early, and the aggregate enumerates every failed file in
    /// batch order.
    pub fn upload<S: Read + Seek + Send>(
        &self,
        files: Vec<UploadFile<S>>,
        owner_id: &str,
        album_id: &str,
    ) -> Result<usize, UploadBatchError> {
        if files.is_empty() {
            return Ok(0);
        }
        if files.len() <= self.sequential_limit {
            self.upload_sequential(files, owner_id, album_id)
        } else {
            self.upload_pooled(files, owner_id, album_id)
        }
    }

    fn upload_sequential<S: Read + Seek>(
        &self,
        files: Vec<UploadFile<S>>,
        owner_id: &str,
        album_id: &str,
    ) -> Result<usize, UploadBatchError> {
        let total = files.len();
        let mut saved = 0;
        for (index, mut file) in files.into_iter().enumerate() {
            match self
                .store
                .save_image(&mut file.stream, &file.name, file.size, owner_id, album_id)
            {
                Ok(_) => saved += 1,
                Err(error) => {
                    warn!(
                        "sequential batch for {}/{} aborted at file {} ({}): {}",
                        owner_id, album_id, index, file.name, error
                    );
                    return Err(UploadBatchError {
                        total,
                        succeeded: saved,
                        failures: vec![FileFailure {
                            index,
                            filename: file.name,
                            worker: None,
                            error,
                        }],
                    });
                }
            }
        }
        info!(
            "sequential batch saved {} files into {}/{}",
            saved, owner_id, album_id
        );
        Ok(saved)
    }

    fn upload_pooled<S: Read + Seek + Send>(
        &self,
        files: Vec<UploadFile<S>>,
        owner_id: &str,
        album_id: &str,
    ) -> Result<usize, UploadBatchError> {
        let total = files.len();
        let workers = self.max_workers.min(total);
        info!(
            "uploading batch of {} files into {}/{} with {} workers",
            total, owner_id, album_id, workers
        );

        let jobs: Mutex<VecDeque<(usize, UploadFile<S>)>> =
            Mutex::new(files.into_iter().enumerate().collect());
        // The only state shared between workers; everything else is pulled
        // from the job queue.
        let failures: Mutex<Vec<FileFailure>> = Mutex::new(Vec::new());
        let saved = AtomicUsize::new(0);
        let store = self.store.as_ref();

        thread::scope(|scope| {
            for worker in 0..workers {
                let jobs = &jobs;
                let failures = &failures;
                let saved = &saved;
                scope.spawn(move || loop {
                    let job = jobs.lock().unwrap().pop_front();
                    let Some((index, mut file)) = job else {
                        break;
                    };
                    match store.save_image(
                        &mut file.stream,
                        &file.name,
                        file.size,
                        owner_id,
                        album_id,
                    ) {
                        Ok(_) => {
                            saved.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(error) => {
                            warn!(
                                "worker {}: file {} ({}) failed: {}",
                                worker, index, file.name, error
                            );
                            failures.lock().unwrap().push(FileFailure {
                                index,
                                filename: file.name,
                                worker: Some(worker),
                                error,
                            });
                        }
                    }
                });
            }
        });

        let saved = saved.load(Ordering::Relaxed);
        let mut failures = failures.into_inner().unwrap();
        if failures.is_empty() {
            info!(
                "pooled batch saved all {} files into {}/{}",
                saved, owner_id, album_id
            );
            return Ok(saved);
        }
        failures.sort_by_key(|f| f.index);
        warn!(
            "pooled batch into {}/{}: {} of {} files failed",
            owner_id,
            album_id,
            failures.len(),
            total
        );
        Err(UploadBatchError {
            total,
            succeeded: saved,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::storage::mock_store::MockImageStore;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&[0u8; 24]);
        data
    }

    fn png_file(name: &str) -> UploadFile<Cursor<Vec<u8>>> {
        let data = png_bytes();
        let size = data.len() as u64;
        UploadFile::new(Cursor::new(data), name, size)
    }

    fn text_file(name: &str) -> UploadFile<Cursor<Vec<u8>>> {
        let data = b"plain text, not an image".to_vec();
        let size = data.len() as u64;
        UploadFile::new(Cursor::new(data), name, size)
    }

    fn pipeline(store: Arc<MockImageStore>) -> UploadPipeline {
        UploadPipeline::new(store, &UploadConfig::default())
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let store = Arc::new(MockImageStore::new());
        let p = pipeline(store.clone());
        let files: Vec<UploadFile<Cursor<Vec<u8>>>> = Vec::new();
        assert_eq!(p.upload(files, "u1", "a1").unwrap(), 0);
        assert_eq!(store.image_count("u1", "a1"), 0);
    }

    #[test]
    fn test_small_batch_runs_sequentially_and_succeeds() {
        let store = Arc::new(MockImageStore::new());
        let p = pipeline(store.clone());
        let files = vec![png_file("a.png"), png_file("b.png"), png_file("c.png")];
        assert_eq!(p.upload(files, "u1", "a1").unwrap(), 3);
        assert_eq!(store.image_count("u1", "a1"), 3);
    }

    #[test]
    fn test_sequential_mode_fails_fast() {
        let store = Arc::new(MockImageStore::new());
        let p = pipeline(store.clone());
        // File #2 (index 1) is invalid; file #3 must never be attempted.
        let files = vec![png_file("a.png"), text_file("b.png"), png_file("c.png")];

        let err = p.upload(files, "u1", "a1").unwrap_err();
        assert!(err.succeeded <= 1);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].index, 1);
        assert_eq!(err.failures[0].filename, "b.png");
        assert!(err.failures[0].worker.is_none());
        // Only the file saved before the failure is on disk.
        assert_eq!(store.image_count("u1", "a1"), err.succeeded);
        assert!(store.image_count("u1", "a1") <= 1);
    }

    #[test]
    fn test_pooled_batch_aggregates_and_keeps_successes() {
        let store = Arc::new(MockImageStore::new());
        let p = pipeline(store.clone());
        // Six files put the batch above the sequential limit; #3 (index 2)
        // is an unsupported type.
        let files = vec![
            png_file("f0.png"),
            png_file("f1.png"),
            text_file("f2.png"),
            png_file("f3.png"),
            png_file("f4.png"),
            png_file("f5.png"),
        ];

        let err = p.upload(files, "u1", "a1").unwrap_err();
        assert_eq!(err.total, 6);
        assert_eq!(err.succeeded, 5);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].index, 2);
        assert_eq!(err.failures[0].filename, "f2.png");
        assert!(err.failures[0].worker.is_some());
        // No rollback: the five good files are all stored.
        assert_eq!(store.image_count("u1", "a1"), 5);
    }

    #[test]
    fn test_pooled_batch_reports_every_failure_in_order() {
        let store = Arc::new(MockImageStore::new());
        let p = pipeline(store.clone());
        let files = vec![
            text_file("f0.png"),
            png_file("f1.png"),
            text_file("f2.png"),
            png_file("f3.png"),
            text_file("f4.png"),
            png_file("f5.png"),
            png_file("f6.png"),
        ];

        let err = p.upload(files, "u1", "a1").unwrap_err();
        assert_eq!(err.succeeded, 4);
        let indices: Vec<usize> = err.failures.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert_eq!(store.image_count("u1", "a1"), 4);
    }

    #[test]
    fn test_pool_size_never_exceeds_batch_size() {
        let store = Arc::new(MockImageStore::new());
        let config = UploadConfig {
            sequential_limit: 0,
            max_workers: 64,
        };
        let p = UploadPipeline::new(store.clone(), &config);
        // Two files through the pooled path; just verify it completes and
        // saves both even when max_workers dwarfs the batch.
        let files = vec![png_file("a.png"), png_file("b.png")];
        assert_eq!(p.upload(files, "u1", "a1").unwrap(), 2);
        assert_eq!(store.image_count("u1", "a1"), 2);
    }

    #[test]
    fn test_all_files_failing_saves_nothing() {
        let store = Arc::new(MockImageStore::new());
        let p = pipeline(store.clone());
        let files: Vec<_> = (0..6).map(|i| text_file(&format!("f{}.png", i))).collect();

        let err = p.upload(files, "u1", "a1").unwrap_err();
        assert_eq!(err.succeeded, 0);
        assert_eq!(err.failures.len(), 6);
        assert_eq!(store.image_count("u1", "a1"), 0);
    }
}
