//! # Download Queue
//!
//! Sidecar assets (subtitles, artwork, metadata) discovered during the
//! structural pass are queued here and fetched afterwards.
//!
//! ## Features
//!
//! - **Concurrency-safe**: the structural pass may enqueue from anywhere
//! - **Bounded Concurrency**: drained by its own worker pool, independent of
//!   the crawl pool, so slow downloads never starve directory discovery
//! - **Pacing**: each fetch waits a random delay drawn from the configured
//!   interval range
//! - **Skip existing**: a file already present locally is never re-fetched
//! - **Cancellable**: once the token fires no new fetch starts and pending
//!   pacing delays end immediately
//!
//! ## Usage
//!
//! ```ignore
//! let queue = DownloadQueue::new();
//! queue.enqueue(DownloadTask::new(url, destination, FileClass::Subtitle)).await;
//! let stats = queue.drain(provider, 5, IntervalRange::new(1, 3), token).await;
//! ```

use bridge_traits::storage::StorageProvider;
use core_runtime::config::{FileClass, IntervalRange};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    pub class: FileClass,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, class: FileClass) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            class,
        }
    }
}

/// Final state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded,
    Skipped,
    Failed,
    Cancelled,
}

/// Drain counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Tasks abandoned after cancellation
    pub cancelled: u64,
}

impl DownloadStats {
    fn record(&mut self, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded => self.downloaded += 1,
            DownloadOutcome::Skipped => self.skipped += 1,
            DownloadOutcome::Failed => self.failed += 1,
            DownloadOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// FIFO queue of sidecar downloads
#[derive(Default)]
pub struct DownloadQueue {
    items: Mutex<VecDeque<DownloadTask>>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task; a destination already queued is not queued twice
    pub async fn enqueue(&self, task: DownloadTask) -> bool {
        let mut items = self.items.lock().await;
        if items.iter().any(|queued| queued.destination == task.destination) {
            return false;
        }
        debug!(destination = ?task.destination, class = ?task.class, "Queued download");
        items.push_back(task);
        true
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Fetch every queued task with at most `threads` in flight.
    ///
    /// Individual failures are logged and counted; draining never fails.
    /// Tasks not started when `cancellation` fires are counted as cancelled.
    pub async fn drain(
        &self,
        provider: Arc<dyn StorageProvider>,
        threads: usize,
        pacing: IntervalRange,
        cancellation: CancellationToken,
    ) -> DownloadStats {
        let tasks: Vec<DownloadTask> = self.items.lock().await.drain(..).collect();
        let mut stats = DownloadStats::default();
        if tasks.is_empty() {
            return stats;
        }

        info!(count = tasks.len(), threads, "Draining download queue");
        let permits = Arc::new(Semaphore::new(threads.max(1)));
        let mut workers = JoinSet::new();

        for task in tasks {
            if cancellation.is_cancelled() {
                stats.record(DownloadOutcome::Cancelled);
                continue;
            }
            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => permit,
                _ = cancellation.cancelled() => {
                    stats.record(DownloadOutcome::Cancelled);
                    continue;
                }
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    stats.record(DownloadOutcome::Failed);
                    continue;
                }
            };
            let provider = Arc::clone(&provider);
            let cancellation = cancellation.clone();
            workers.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    outcome = fetch(provider.as_ref(), &task, pacing) => outcome,
                    _ = cancellation.cancelled() => DownloadOutcome::Cancelled,
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    warn!(error = %e, "Download worker panicked");
                    stats.record(DownloadOutcome::Failed);
                }
            }
        }

        info!(
            downloaded = stats.downloaded,
            skipped = stats.skipped,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "Download queue drained"
        );
        stats
    }
}

async fn fetch(
    provider: &dyn StorageProvider,
    task: &DownloadTask,
    pacing: IntervalRange,
) -> DownloadOutcome {
    if tokio::fs::try_exists(&task.destination).await.unwrap_or(false) {
        debug!(destination = ?task.destination, "Sidecar already present");
        return DownloadOutcome::Skipped;
    }

    let delay = pacing.sample(&mut rand::thread_rng());
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let body = match provider.download(&task.url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(destination = ?task.destination, error = %e, "Download failed");
            return DownloadOutcome::Failed;
        }
    };

    match write_file(&task.destination, &body).await {
        Ok(()) => {
            debug!(destination = ?task.destination, bytes = body.len(), "Downloaded sidecar");
            DownloadOutcome::Downloaded
        }
        Err(e) => {
            warn!(destination = ?task.destination, error = %e, "Failed to write sidecar");
            DownloadOutcome::Failed
        }
    }
}

async fn write_file(destination: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = destination.with_file_name(format!("{}.part", file_name));
    tokio::fs::write(&partial, body).await?;
    tokio::fs::rename(&partial, destination).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::storage::RemoteFile;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StorageProvider for CountingProvider {
        async fn list_directory(&self, _path: &str) -> BridgeResult<Vec<RemoteFile>> {
            Ok(Vec::new())
        }

        async fn download(&self, url: &str) -> BridgeResult<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.ends_with("broken") {
                Err(BridgeError::OperationFailed("HTTP 502 error".into()))
            } else {
                Ok(Bytes::from(url.to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_drain_downloads_skips_and_fails() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("old.srt");
        std::fs::write(&existing, "keep").unwrap();

        let queue = DownloadQueue::new();
        queue
            .enqueue(DownloadTask::new("u/new", dir.path().join("sub/new.srt"), FileClass::Subtitle))
            .await;
        queue
            .enqueue(DownloadTask::new("u/old", &existing, FileClass::Subtitle))
            .await;
        queue
            .enqueue(DownloadTask::new("u/broken", dir.path().join("x.nfo"), FileClass::Metadata))
            .await;
        assert_eq!(queue.len().await, 3);

        let provider = Arc::new(CountingProvider::default());
        let stats = queue
            .drain(provider.clone(), 2, IntervalRange::none(), CancellationToken::new())
            .await;

        assert_eq!(
            stats,
            DownloadStats {
                downloaded: 1,
                skipped: 1,
                failed: 1,
                cancelled: 0,
            }
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "keep");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("sub/new.srt")).unwrap(),
            "u/new"
        );
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_destination_not_queued_twice() {
        let queue = DownloadQueue::new();
        assert!(queue.enqueue(DownloadTask::new("a", "/x/a.jpg", FileClass::Image)).await);
        assert!(!queue.enqueue(DownloadTask::new("b", "/x/a.jpg", FileClass::Image)).await);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_delays_each_fetch() {
        let dir = TempDir::new().unwrap();
        let queue = DownloadQueue::new();
        queue
            .enqueue(DownloadTask::new("u/a", dir.path().join("a.jpg"), FileClass::Image))
            .await;

        let started = tokio::time::Instant::now();
        let stats = queue
            .drain(
                Arc::new(CountingProvider::default()),
                1,
                IntervalRange::new(2, 2),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(stats.downloaded, 1);
        assert!(started.elapsed() >= std::time::Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_pending_fetches() {
        let dir = TempDir::new().unwrap();
        let queue = DownloadQueue::new();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            queue
                .enqueue(DownloadTask::new(format!("u/{}", name), dir.path().join(name), FileClass::Image))
                .await;
        }

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let provider = Arc::new(CountingProvider::default());
        let stats = queue
            .drain(provider.clone(), 1, IntervalRange::new(60, 60), token)
            .await;

        assert_eq!(stats.downloaded, 0);
        assert_eq!(stats.cancelled, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("a.jpg").exists());
    }
}
