//! # Mirror Synchronizer
//!
//! Turns a [`Snapshot`] into pointer files and sidecar assets under the
//! configured target directory.
//!
//! ## Workflow
//!
//! 1. Validate the configuration (fatal, before any I/O)
//! 2. Structural pass: one pointer per video, existing pointers untouched
//! 3. Queue sidecars whose name starts with a sibling video's stem (plus
//!    folder artwork when enabled)
//! 4. Drain the download queue on its own bounded pool
//! 5. Full mode only: delete pointers with no video upstream and remove
//!    directories left without pointers
//! 6. Count the pointers present
//!
//! Per-file failures are logged and counted; the run is never aborted by
//! them. Cancellation stops the download pool and returns before the
//! reverse pass, so an interrupted run never deletes anything.

use crate::download_queue::{DownloadQueue, DownloadTask};
use crate::error::{Result, SyncError};
use crate::paths::{
    list_pointer_files, local_path, pointer_relative_path, prune_pointerless_dirs, write_atomic,
};
use crate::snapshot::{is_within, join_relative, Snapshot};
use bridge_traits::storage::StorageProvider;
use core_runtime::config::{stem_of, FileClass, MirrorConfiguration, UpdateMode};
use provider_alist::download_url;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Counters for one synchronization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub created: u64,
    pub skipped: u64,
    pub failed: u64,
    pub downloaded: u64,
    pub download_skipped: u64,
    pub download_failed: u64,
    pub deleted_pointers: u64,
    pub deleted_dirs: u64,
    /// Pointer files under the mirror root after the run
    pub pointers_present: u64,
}

/// A pointer the snapshot calls for
#[derive(Debug, Clone, PartialEq, Eq)]
struct PointerWork {
    relative_dir: String,
    relative_pointer: String,
    url: String,
}

#[derive(Debug, Default)]
struct MirrorPlan {
    pointers: Vec<PointerWork>,
    downloads: Vec<DownloadTask>,
}

#[derive(Debug, Default)]
struct StructuralResult {
    created: u64,
    skipped: u64,
    failed: u64,
}

/// Pointer paths (relative to the mirror root) for every video in the
/// snapshot whose size is at least `min_size`.
pub fn expected_pointers(
    snapshot: &Snapshot,
    pointer_extension: &str,
    min_size: u64,
) -> BTreeSet<String> {
    snapshot
        .root
        .files()
        .into_iter()
        .filter(|(_, entry)| entry.is_video() && entry.size >= min_size)
        .map(|(path, _)| pointer_relative_path(&path, pointer_extension))
        .collect()
}

/// Writes the local mirror for one configuration
pub struct MirrorSynchronizer {
    provider: Arc<dyn StorageProvider>,
    cancellation: CancellationToken,
}

impl MirrorSynchronizer {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self {
            provider,
            cancellation: CancellationToken::new(),
        }
    }

    /// Stop downloading and skip the reverse pass when the token is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Bring the local mirror in line with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` for an invalid configuration,
    /// `SyncError::Io` if the target directory cannot be created and
    /// `SyncError::Cancelled` if the token fired. Every other failure is
    /// reflected in the returned counters.
    #[instrument(skip(self, config, snapshot), fields(config_id = %config.id, mode = ?config.update_mode))]
    pub async fn synchronize(
        &self,
        config: &MirrorConfiguration,
        snapshot: &Snapshot,
    ) -> Result<SyncStats> {
        config.validate()?;

        let root = config.target_directory.clone();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SyncError::io(&root, e))?;

        let plan = Self::plan(config, snapshot);
        info!(
            pointers = plan.pointers.len(),
            downloads = plan.downloads.len(),
            "Planned mirror"
        );

        let mut stats = SyncStats::default();

        let structural = {
            let root = root.clone();
            let pointers = plan.pointers;
            tokio::task::spawn_blocking(move || Self::write_pointers(&root, &pointers)).await?
        };
        stats.created = structural.created;
        stats.skipped = structural.skipped;
        stats.failed = structural.failed;

        let queue = DownloadQueue::new();
        for task in plan.downloads {
            queue.enqueue(task).await;
        }
        let downloads = queue
            .drain(
                Arc::clone(&self.provider),
                config.download_threads,
                config.download_interval,
                self.cancellation.clone(),
            )
            .await;
        stats.downloaded = downloads.downloaded;
        stats.download_skipped = downloads.skipped;
        stats.download_failed = downloads.failed;

        if self.cancellation.is_cancelled() {
            warn!(
                created = stats.created,
                downloaded = stats.downloaded,
                "Synchronization cancelled before the reverse pass"
            );
            return Err(SyncError::Cancelled);
        }

        if config.update_mode == UpdateMode::Full {
            let expected = expected_pointers(snapshot, &config.pointer_extension, 0);
            let (pointers, dirs) = self
                .prune(&root, &config.pointer_extension, expected, snapshot)
                .await?;
            stats.deleted_pointers = pointers;
            stats.deleted_dirs = dirs;
        }

        let extension = config.pointer_extension.clone();
        stats.pointers_present = tokio::task::spawn_blocking(move || {
            list_pointer_files(&root, &extension).map(|set| set.len() as u64)
        })
        .await??;

        info!(
            created = stats.created,
            skipped = stats.skipped,
            failed = stats.failed,
            downloaded = stats.downloaded,
            deleted_pointers = stats.deleted_pointers,
            deleted_dirs = stats.deleted_dirs,
            present = stats.pointers_present,
            "Synchronization finished"
        );

        Ok(stats)
    }

    fn plan(config: &MirrorConfiguration, snapshot: &Snapshot) -> MirrorPlan {
        let mut plan = MirrorPlan::default();
        let site = config.site_url.as_str();
        let remote_root = snapshot.root_remote_path.as_str();

        snapshot.root.for_each_directory("", &mut |dir, node| {
            let videos: Vec<_> = node.children().iter().filter(|c| c.is_video()).collect();
            let stems: Vec<&str> = videos.iter().map(|v| stem_of(&v.name)).collect();

            for video in &videos {
                let relative_file = join_relative(dir, &video.name);
                let sign = if config.update_existing {
                    video.sign_token.as_deref()
                } else {
                    None
                };
                plan.pointers.push(PointerWork {
                    relative_dir: dir.to_string(),
                    relative_pointer: pointer_relative_path(
                        &relative_file,
                        &config.pointer_extension,
                    ),
                    url: download_url(site, remote_root, &relative_file, sign),
                });
            }

            for child in node.children() {
                let Some(class) = child.class.filter(|_| !child.is_directory) else {
                    continue;
                };
                if class == FileClass::Video {
                    continue;
                }

                let matches_video = config.sidecars.allows(class)
                    && stems.iter().any(|stem| child.name.starts_with(stem));
                let folder_art = class == FileClass::Image
                    && config.sidecars.folder_images
                    && !videos.is_empty();

                if matches_video || folder_art {
                    let relative_file = join_relative(dir, &child.name);
                    plan.downloads.push(DownloadTask::new(
                        download_url(site, remote_root, &relative_file, child.sign_token.as_deref()),
                        local_path(&config.target_directory, &relative_file),
                        class,
                    ));
                }
            }
        });

        plan
    }

    fn write_pointers(root: &Path, pointers: &[PointerWork]) -> StructuralResult {
        let mut result = StructuralResult::default();
        let mut per_directory: BTreeMap<&str, u64> = BTreeMap::new();

        for work in pointers {
            let path = local_path(root, &work.relative_pointer);
            if path.exists() {
                result.skipped += 1;
                continue;
            }

            match write_atomic(&path, work.url.as_bytes()) {
                Ok(()) => {
                    result.created += 1;
                    *per_directory.entry(work.relative_dir.as_str()).or_default() += 1;
                    debug!(pointer = %work.relative_pointer, "Created pointer");
                }
                Err(e) => {
                    result.failed += 1;
                    warn!(pointer = %work.relative_pointer, error = %e, "Failed to create pointer");
                }
            }
        }

        for (dir, created) in per_directory {
            let dir = if dir.is_empty() { "." } else { dir };
            debug!(dir = %dir, created, "Pointers created in directory");
        }

        result
    }

    /// Full-mode reverse pass. Subtrees the crawl could not list are left
    /// untouched.
    async fn prune(
        &self,
        root: &Path,
        extension: &str,
        expected: BTreeSet<String>,
        snapshot: &Snapshot,
    ) -> Result<(u64, u64)> {
        let root: PathBuf = root.to_path_buf();
        let extension = extension.to_string();
        let incomplete = snapshot.incomplete_paths.clone();

        tokio::task::spawn_blocking(move || {
            let mut deleted = 0u64;
            for relative in list_pointer_files(&root, &extension)? {
                if expected.contains(&relative)
                    || incomplete.iter().any(|prefix| is_within(&relative, prefix))
                {
                    continue;
                }
                let path = local_path(&root, &relative);
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(pointer = %relative, "Deleted stale pointer");
                        deleted += 1;
                    }
                    Err(e) => warn!(pointer = %relative, error = %e, "Failed to delete pointer"),
                }
            }

            let dirs = prune_pointerless_dirs(&root, &extension, |dir| {
                incomplete
                    .iter()
                    .any(|prefix| is_within(dir, prefix) || is_within(prefix, dir))
            })?;

            Ok::<_, SyncError>((deleted, dirs as u64))
        })
        .await?
    }
}
