//! Directory-to-bucket upload engine.
//!
//! One run walks the source tree, derives a key per shot and pushes each shot
//! to the bucket unless the key is already there:
//!
//! ```text
//! walker -> derive_key -> wait_for_absence -> read_file -> put_object
//! ```
//!
//! # Guarantees
//! - Only a traversal failure aborts the run. Every other failure is scoped
//!   to its file and shows up in the [`UploadReport`].
//! - Files run concurrently, at most `max_concurrency` at a time, in no
//!   particular order. Within a file the steps above run strictly in order.
//! - A key that is still present when the absence wait gives up is skipped,
//!   so re-running over an unchanged tree uploads nothing.
//!
//! # Cancellation
//! [`SyncEngine::upload_until`] takes a shutdown future. Once it resolves no
//! new files start, in-flight files are dropped and reported as cancelled.
//!
//! Pass a [`crate::resilience::ResilientStore`] as the store to get retries
//! and circuit breaking on every remote call.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::time::Duration;

use futures::future;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::contract::{Filesystem, ObjectAcl, ObjectStore};
use crate::error::{FileError, StoreError, TraversalError};
use crate::keymap::{derive_key, StorageKey};
use crate::walker::DirectoryWalker;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Files processed at the same time.
    pub max_concurrency: usize,
    pub acl: Option<ObjectAcl>,
    /// How long to wait for an existing key to disappear before skipping it.
    pub absence_timeout: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            acl: Some(ObjectAcl::PublicRead),
            absence_timeout: Duration::ZERO,
        }
    }
}

/// One file scheduled for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub source_path: PathBuf,
    pub bucket: String,
    pub key: StorageKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub key: StorageKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUpload {
    pub path: PathBuf,
    pub key: Option<StorageKey>,
    pub message: String,
}

/// Outcome of one upload run.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub run_id: Uuid,
    pub bucket: String,
    pub discovered: usize,
    pub uploaded: Vec<UploadedFile>,
    /// Keys that already existed remotely.
    pub skipped: Vec<UploadedFile>,
    pub failed: Vec<FailedUpload>,
    /// Files not finished when the run was shut down.
    pub cancelled: Vec<PathBuf>,
}

impl UploadReport {
    fn new(run_id: Uuid, bucket: &str, discovered: usize) -> Self {
        Self {
            run_id,
            bucket: bucket.to_owned(),
            discovered,
            uploaded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Paths that failed, for quick assertions and summaries.
    pub fn failed_paths(&self) -> Vec<&Path> {
        self.failed.iter().map(|f| f.path.as_path()).collect()
    }

    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Uploaded(task) => self.uploaded.push(UploadedFile {
                path: task.source_path,
                key: task.key,
            }),
            FileOutcome::Skipped(task) => self.skipped.push(UploadedFile {
                path: task.source_path,
                key: task.key,
            }),
            FileOutcome::Failed { path, key, error } => self.failed.push(FailedUpload {
                path,
                key,
                message: error.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
enum FileOutcome {
    Uploaded(UploadTask),
    Skipped(UploadTask),
    Failed {
        path: PathBuf,
        key: Option<StorageKey>,
        error: FileError,
    },
}

impl FileOutcome {
    fn path(&self) -> &Path {
        match self {
            FileOutcome::Uploaded(task) | FileOutcome::Skipped(task) => &task.source_path,
            FileOutcome::Failed { path, .. } => path,
        }
    }
}

pub struct SyncEngine<'a, S: ObjectStore + ?Sized, F: Filesystem + ?Sized> {
    store: &'a S,
    fs: &'a F,
    options: UploadOptions,
}

impl<'a, S: ObjectStore + ?Sized, F: Filesystem + ?Sized> SyncEngine<'a, S, F> {
    pub fn new(store: &'a S, fs: &'a F, options: UploadOptions) -> Self {
        Self { store, fs, options }
    }

    /// Upload every shot under `root` to `bucket`, waiting for all of them.
    pub async fn upload(
        &self,
        root: &Path,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<UploadReport, TraversalError> {
        self.upload_until(root, bucket, prefix, future::pending::<()>())
            .await
    }

    /// Like [`Self::upload`], but stops when `shutdown` resolves.
    pub async fn upload_until<C>(
        &self,
        root: &Path,
        bucket: &str,
        prefix: Option<&str>,
        shutdown: C,
    ) -> Result<UploadReport, TraversalError>
    where
        C: Future<Output = ()>,
    {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("upload", %run_id, bucket, root = %root.display());
        self.run(run_id, root, bucket, prefix, shutdown)
            .instrument(span)
            .await
    }

    async fn run<C>(
        &self,
        run_id: Uuid,
        root: &Path,
        bucket: &str,
        prefix: Option<&str>,
        shutdown: C,
    ) -> Result<UploadReport, TraversalError>
    where
        C: Future<Output = ()>,
    {
        info!("[UPLOAD] Starting upload run");
        let files = DirectoryWalker::new(self.fs).enumerate(root).await?;
        let mut report = UploadReport::new(run_id, bucket, files.len());
        info!(files = files.len(), "[UPLOAD] Discovered files");

        let mut pending: HashSet<PathBuf> = files.iter().cloned().collect();
        let mut outcomes = pin!(stream::iter(files)
            .map(|path| self.upload_file(root, bucket, prefix, path))
            .buffer_unordered(self.options.max_concurrency.max(1))
            .take_until(shutdown));

        while let Some(outcome) = outcomes.next().await {
            pending.remove(outcome.path());
            report.record(outcome);
        }

        if !pending.is_empty() {
            warn!(cancelled = pending.len(), "[UPLOAD] Run shut down before all files finished");
            let mut cancelled: Vec<PathBuf> = pending.into_iter().collect();
            cancelled.sort();
            report.cancelled = cancelled;
        }

        info!(
            discovered = report.discovered,
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            "[UPLOAD] Upload run complete"
        );
        Ok(report)
    }

    async fn upload_file(
        &self,
        root: &Path,
        bucket: &str,
        prefix: Option<&str>,
        path: PathBuf,
    ) -> FileOutcome {
        let key = match derive_key(root, &path, prefix) {
            Ok(key) => key,
            Err(e) => {
                error!(path = %path.display(), error = %e, "[UPLOAD][ERROR] Cannot derive key");
                return FileOutcome::Failed {
                    path,
                    key: None,
                    error: e.into(),
                };
            }
        };
        let task = UploadTask {
            source_path: path,
            bucket: bucket.to_owned(),
            key,
        };

        match self.execute(&task).await {
            Ok(outcome) => outcome,
            Err(error) => {
                error!(
                    path = %task.source_path.display(),
                    key = %task.key,
                    error = %error,
                    "[UPLOAD][ERROR] Upload failed"
                );
                FileOutcome::Failed {
                    path: task.source_path,
                    key: Some(task.key),
                    error,
                }
            }
        }
    }

    async fn execute(&self, task: &UploadTask) -> Result<FileOutcome, FileError> {
        let key = task.key.as_str();

        match self
            .store
            .wait_for_absence(&task.bucket, key, self.options.absence_timeout)
            .await
        {
            Ok(()) => {}
            Err(StoreError::Timeout { .. }) => {
                info!(path = %task.source_path.display(), key, "[UPLOAD] Key already present, skipping");
                return Ok(FileOutcome::Skipped(task.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let bytes = self
            .fs
            .read_file(&task.source_path)
            .await
            .map_err(|source| FileError::Read {
                path: task.source_path.clone(),
                source,
            })?;

        self.store
            .put_object(&task.bucket, key, &bytes, self.options.acl)
            .await?;
        info!(path = %task.source_path.display(), key, size = bytes.len(), "[UPLOAD] Uploaded");
        Ok(FileOutcome::Uploaded(task.clone()))
    }
}
