//! # Snapshot Cache
//!
//! Latest-only persistence of snapshots keyed by configuration id.
//!
//! A missing entry is not an error: callers treat it as a first run. Stores
//! always overwrite, and the file backend replaces the artifact atomically so
//! a reader never observes a half-written snapshot.

use crate::error::{Result, SyncError};
use crate::paths::write_atomic;
use crate::snapshot::{Snapshot, SNAPSHOT_FORMAT_VERSION};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Latest snapshot for a configuration, if any
    async fn load(&self, config_id: &str) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot for a configuration
    async fn store(&self, config_id: &str, snapshot: &Snapshot) -> Result<()>;
}

/// One JSON document per configuration under a cache directory
pub struct FileSnapshotCache {
    dir: PathBuf,
}

impl FileSnapshotCache {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, config_id: &str) -> PathBuf {
        self.dir.join(format!("snapshot_{}.json", config_id))
    }

    fn read(path: &Path) -> Result<Option<Snapshot>> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::io(path, e)),
        };

        let snapshot: Snapshot = match serde_json::from_slice(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = ?path, error = %e, "Discarding unreadable snapshot");
                return Ok(None);
            }
        };

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            warn!(
                path = ?path,
                found = snapshot.format_version,
                expected = SNAPSHOT_FORMAT_VERSION,
                "Discarding snapshot with unsupported format version"
            );
            return Ok(None);
        }

        Ok(Some(snapshot))
    }
}

#[async_trait]
impl SnapshotCache for FileSnapshotCache {
    async fn load(&self, config_id: &str) -> Result<Option<Snapshot>> {
        let path = self.path_for(config_id);
        let snapshot = tokio::task::spawn_blocking(move || Self::read(&path)).await??;
        debug!(config_id, found = snapshot.is_some(), "Loaded snapshot cache");
        Ok(snapshot)
    }

    async fn store(&self, config_id: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.path_for(config_id);
        let body = serde_json::to_vec_pretty(snapshot)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &body)).await??;
        info!(config_id, path = ?path, "Stored snapshot");
        Ok(())
    }
}

/// Process-local cache for tests and dry runs
#[derive(Default)]
pub struct MemorySnapshotCache {
    entries: RwLock<HashMap<String, Snapshot>>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn load(&self, config_id: &str) -> Result<Option<Snapshot>> {
        Ok(self.entries.read().await.get(config_id).cloned())
    }

    async fn store(&self, config_id: &str, snapshot: &Snapshot) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(config_id.to_string(), snapshot.clone());
        Ok(())
    }
}
