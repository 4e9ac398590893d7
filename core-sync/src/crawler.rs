//! # Remote Tree Crawler
//!
//! Walks a remote hierarchy concurrently and produces a [`Snapshot`].
//!
//! ## Overview
//!
//! One listing call is issued per directory. Subdirectory listings fan out
//! recursively, bounded by a semaphore sized to the configured concurrency.
//! A permit is held only while the listing call is in flight, so a parent
//! waiting on its children never occupies a slot.
//!
//! ## Failure semantics
//!
//! - An authorization failure anywhere aborts the whole crawl. Sibling
//!   listings still pending are dropped and nothing is returned.
//! - Any other listing failure (after the transport's own retries) prunes
//!   only that subtree. The failure is logged, counted, and recorded in
//!   [`Snapshot::incomplete_paths`]. A failing root listing is fatal to the
//!   crawl since there is nothing to snapshot.
//!
//! ## Ownership
//!
//! Each recursive lister owns the subtree it builds and hands it back to its
//! parent together with its counters; no shared tree or lock exists.

use crate::error::{Result, SyncError};
use crate::snapshot::{join_relative, RemoteEntry, Snapshot};
use bridge_traits::error::BridgeError;
use bridge_traits::storage::{RemoteFile, StorageProvider};
use core_runtime::config::MirrorConfiguration;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Per-crawl counters, aggregated bottom-up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub directories_listed: u64,
    pub directories_failed: u64,
    pub entries_ignored: u64,
    pub files: u64,
    pub failed_paths: Vec<String>,
}

impl CrawlStats {
    fn merge(&mut self, other: CrawlStats) {
        self.directories_listed += other.directories_listed;
        self.directories_failed += other.directories_failed;
        self.entries_ignored += other.entries_ignored;
        self.files += other.files;
        self.failed_paths.extend(other.failed_paths);
    }
}

/// Result of a successful crawl
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub snapshot: Snapshot,
    pub stats: CrawlStats,
}

/// Concurrent crawler over a [`StorageProvider`]
pub struct RemoteTreeCrawler {
    provider: Arc<dyn StorageProvider>,
    config: MirrorConfiguration,
    permits: Arc<Semaphore>,
    cancellation: CancellationToken,
}

impl RemoteTreeCrawler {
    pub fn new(provider: Arc<dyn StorageProvider>, config: &MirrorConfiguration) -> Self {
        Self {
            provider,
            config: config.clone(),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            cancellation: CancellationToken::new(),
        }
    }

    /// Abort the crawl when the token is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    fn remote_path(&self, relative: &str) -> String {
        if relative.is_empty() {
            self.config.root_path.clone()
        } else if self.config.root_path == "/" {
            format!("/{}", relative)
        } else {
            format!("{}/{}", self.config.root_path, relative)
        }
    }

    /// Crawl the configured root.
    ///
    /// # Errors
    ///
    /// - `SyncError::Unauthorized` if any listing is rejected for credentials
    /// - `SyncError::Provider` if the root itself cannot be listed
    /// - `SyncError::Cancelled` if the cancellation token fired
    #[instrument(skip(self), fields(config_id = %self.config.id, root = %self.config.root_path))]
    pub async fn crawl(&self) -> Result<CrawlOutcome> {
        info!("Starting remote crawl");

        let listing = self.list(String::new()).await?;
        let (children, mut stats) = self.build_children(String::new(), listing).await?;

        let mut snapshot = Snapshot::new(
            self.config.id.clone(),
            self.config.root_path.clone(),
            RemoteEntry::directory("", children),
        );
        stats.failed_paths.sort();
        snapshot.incomplete_paths = stats.failed_paths.clone();

        info!(
            directories = stats.directories_listed,
            failed = stats.directories_failed,
            files = stats.files,
            ignored = stats.entries_ignored,
            "Remote crawl finished"
        );

        Ok(CrawlOutcome { snapshot, stats })
    }

    /// One bounded listing call
    async fn list(&self, relative_dir: String) -> Result<Vec<RemoteFile>> {
        if self.cancellation.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let remote_path = self.remote_path(&relative_dir);
        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit
                .map_err(|_| SyncError::Cancelled)?,
            _ = self.cancellation.cancelled() => return Err(SyncError::Cancelled),
        };

        debug!(path = %remote_path, "Listing remote directory");
        let result = tokio::select! {
            result = self.provider.list_directory(&remote_path) => result,
            _ = self.cancellation.cancelled() => return Err(SyncError::Cancelled),
        };

        result.map_err(|e| match e {
            BridgeError::Unauthorized(msg) => {
                self.cancellation.cancel();
                SyncError::Unauthorized(msg)
            }
            other => SyncError::Provider(format!("Listing {} failed: {}", remote_path, other)),
        })
    }

    /// List a subdirectory; non-fatal failures yield an empty, flagged subtree
    fn crawl_directory(&self, relative_dir: String) -> BoxFuture<'_, Result<(Vec<RemoteEntry>, CrawlStats)>> {
        async move {
            let listing = match self.list(relative_dir.clone()).await {
                Ok(listing) => listing,
                Err(e) if e.is_fatal() || matches!(e, SyncError::Cancelled) => return Err(e),
                Err(e) => {
                    warn!(path = %relative_dir, error = %e, "Skipping subtree after listing failure");
                    return Ok((
                        Vec::new(),
                        CrawlStats {
                            directories_failed: 1,
                            failed_paths: vec![relative_dir],
                            ..CrawlStats::default()
                        },
                    ));
                }
            };

            self.build_children(relative_dir, listing).await
        }
        .boxed()
    }

    /// Turn one listing into child nodes, recursing into subdirectories
    async fn build_children(
        &self,
        relative_dir: String,
        listing: Vec<RemoteFile>,
    ) -> Result<(Vec<RemoteEntry>, CrawlStats)> {
        let mut stats = CrawlStats {
            directories_listed: 1,
            ..CrawlStats::default()
        };

        let mut children: Vec<RemoteEntry> = Vec::with_capacity(listing.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut pending_dirs: Vec<(usize, String)> = Vec::new();

        for item in listing {
            if self.config.is_ignored(&item.name) {
                debug!(name = %item.name, "Ignoring entry");
                stats.entries_ignored += 1;
                continue;
            }

            let entry = if item.is_dir {
                RemoteEntry::directory(item.name.clone(), Vec::new())
            } else {
                stats.files += 1;
                RemoteEntry {
                    class: self.config.classification.classify(&item.name),
                    ..RemoteEntry::file(item.name.clone(), item.size, None)
                }
            };
            let entry = RemoteEntry {
                modified_at: item.modified_at,
                sign_token: if item.is_dir { None } else { item.sign },
                ..entry
            };

            // Last wins on duplicate names, keeping the first position
            let index = match positions.get(&entry.name) {
                Some(&index) => {
                    warn!(name = %entry.name, dir = %relative_dir, "Duplicate sibling name, keeping last");
                    if !children[index].is_directory {
                        stats.files -= 1;
                    }
                    pending_dirs.retain(|(i, _)| *i != index);
                    children[index] = entry;
                    index
                }
                None => {
                    positions.insert(entry.name.clone(), children.len());
                    children.push(entry);
                    children.len() - 1
                }
            };

            if children[index].is_directory {
                pending_dirs.push((index, join_relative(&relative_dir, &children[index].name)));
            }
        }

        let subtrees = try_join_all(
            pending_dirs
                .iter()
                .map(|(_, path)| self.crawl_directory(path.clone())),
        )
        .await?;

        for ((index, _), (grandchildren, child_stats)) in pending_dirs.into_iter().zip(subtrees) {
            children[index].children = Some(grandchildren);
            stats.merge(child_stats);
        }

        Ok((children, stats))
    }
}
