use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::models::{DownloadTask, Manifest};
use crate::engine::state::SyncEvent;

pub mod mirror;

use mirror::MirrorSelector;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A single failed attempt at retrieving one file. Always retried.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download incomplete: received {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("synchronization cancelled")]
    Cancelled,
    #[error("manifest lists files but no mirrors")]
    NoMirrors,
    #[error("giving up on {path} after {attempts} attempts: {last}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        #[source]
        last: TransferError,
    },
}

/// Transport used to pull one remote file onto disk.
pub trait FileFetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        destination: &Path,
    ) -> impl Future<Output = Result<(), TransferError>> + Send;
}

#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub concurrency: usize,
    pub retry_delay: Duration,
    /// `None` retries a failing file forever.
    pub max_attempts: Option<u32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: None,
        }
    }
}

pub struct DownloadOrchestrator<F> {
    fetcher: F,
    options: SyncOptions,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl<F: FileFetcher> DownloadOrchestrator<F> {
    pub fn new(fetcher: F, options: SyncOptions) -> Self {
        Self {
            fetcher,
            options,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Download every file in `manifest` below `root`, returning once all of them landed.
    ///
    /// Completion order between files is unspecified. Mirror selection follows the
    /// manifest order of first attempts, then strict round-robin over all attempts.
    pub async fn sync(
        &self,
        manifest: &Manifest,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        if manifest.files.is_empty() {
            debug!("sync: manifest lists no files, nothing to do");
            return Ok(());
        }
        let mirrors = MirrorSelector::new(manifest.mirrors.clone()).ok_or(SyncError::NoMirrors)?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let concurrency = self.options.concurrency.max(1);
        info!(
            "sync: {} files ({} declared, {} bytes) from {} mirrors into {} with {} workers",
            manifest.files.len(),
            manifest.total_files,
            manifest.total_bytes,
            mirrors.mirror_count(),
            root.display(),
            concurrency
        );
        self.emit(SyncEvent::Started {
            total_files: manifest.files.len(),
        });

        let mut pending = stream::iter(
            manifest
                .files
                .iter()
                .map(|relative| DownloadTask::new(root, relative)),
        )
        .map(|task| self.run_task(task, manifest, &mirrors, cancel))
        .buffer_unordered(concurrency);

        while let Some(result) = pending.next().await {
            // Dropping the stream on error abandons in-flight and queued tasks.
            result?;
        }

        self.emit(SyncEvent::Finished);
        info!("sync: all {} files retrieved", manifest.files.len());
        Ok(())
    }

    async fn run_task(
        &self,
        task: DownloadTask,
        manifest: &Manifest,
        mirrors: &MirrorSelector,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            attempt += 1;
            let mirror = mirrors.next();
            let url = manifest.file_url(mirror, &task.relative_path);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                outcome = self.attempt(&url, &task.destination) => outcome,
            };

            let err = match outcome {
                Ok(()) => {
                    debug!("sync: completed {} (attempt {})", task.relative_path, attempt);
                    self.emit(SyncEvent::FileCompleted {
                        path: task.relative_path,
                        attempts: attempt,
                    });
                    return Ok(());
                }
                Err(err) => err,
            };

            warn!(
                "sync: error downloading {} from {} (attempt {}): {}",
                task.relative_path, mirror, attempt, err
            );
            self.emit(SyncEvent::FileFailed {
                path: task.relative_path.clone(),
                attempt,
                mirror: mirror.to_owned(),
                error: err.to_string(),
            });

            if let Some(max) = self.options.max_attempts
                && attempt >= max
            {
                return Err(SyncError::RetriesExhausted {
                    path: task.relative_path,
                    attempts: attempt,
                    last: err,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(self.options.retry_delay) => {}
            }
        }
    }

    async fn attempt(&self, url: &str, destination: &Path) -> Result<(), TransferError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Always re-fetch: no resume, no comparison with what is on disk.
        match fs::remove_file(destination).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.fetcher.fetch(url, destination).await
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.events {
            events.send(event).ok();
        }
    }
}
