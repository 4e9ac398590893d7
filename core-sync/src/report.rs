//! # Invalid-Entry Report
//!
//! Directory-shaped JSON record of the pointer files a validation run found
//! invalid. Every leaf carries the literal value `"invalid"`:
//!
//! ```json
//! { "Show": { "S01": { "e1.strm": "invalid" } }, "a.strm": "invalid" }
//! ```
//!
//! One report exists per configuration; each validation run overwrites it.
//! [`cleanup_invalid`] consumes it.

use crate::error::{Result, SyncError};
use crate::paths::{local_path, remove_empty_ancestors, write_atomic};
use core_runtime::config::MirrorConfiguration;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const INVALID_MARKER: &str = "invalid";

/// Set of invalid pointer paths relative to the mirror root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidEntryReport {
    entries: BTreeSet<String>,
}

impl InvalidEntryReport {
    pub fn new(entries: BTreeSet<String>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &BTreeSet<String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nested object mirroring the local directory structure
    pub fn to_tree(&self) -> Value {
        let mut root = Map::new();
        for entry in &self.entries {
            let parts: Vec<&str> = entry.split('/').filter(|p| !p.is_empty()).collect();
            let Some((leaf, dirs)) = parts.split_last() else {
                continue;
            };

            let mut current = &mut root;
            for dir in dirs {
                let node = current
                    .entry(dir.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                let Value::Object(map) = node else {
                    unreachable!("node was just made an object");
                };
                current = map;
            }
            current.insert(leaf.to_string(), Value::String(INVALID_MARKER.to_string()));
        }
        Value::Object(root)
    }

    /// Flatten a nested report back into relative paths
    pub fn from_tree(tree: &Value) -> Result<Self> {
        fn walk(prefix: &str, value: &Value, out: &mut BTreeSet<String>) -> Result<()> {
            match value {
                Value::Object(map) => {
                    for (name, child) in map {
                        let path = if prefix.is_empty() {
                            name.clone()
                        } else {
                            format!("{}/{}", prefix, name)
                        };
                        walk(&path, child, out)?;
                    }
                    Ok(())
                }
                Value::String(marker) if marker == INVALID_MARKER && !prefix.is_empty() => {
                    out.insert(prefix.to_string());
                    Ok(())
                }
                other => Err(SyncError::Provider(format!(
                    "Unexpected value in invalid-entry report at {:?}: {}",
                    prefix, other
                ))),
            }
        }

        let mut entries = BTreeSet::new();
        walk("", tree, &mut entries)?;
        Ok(Self { entries })
    }
}

/// Report artifacts under one directory
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, config_id: &str) -> PathBuf {
        self.dir
            .join(format!("invalid_file_trees_{}.json", config_id))
    }

    /// Overwrite the report for a configuration
    pub async fn write(&self, config_id: &str, report: &InvalidEntryReport) -> Result<PathBuf> {
        let path = self.path_for(config_id);
        let body = serde_json::to_vec_pretty(&report.to_tree())?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &body)).await??;
        info!(config_id, invalid = report.len(), path = ?path, "Wrote invalid-entry report");
        Ok(path)
    }

    pub async fn load(&self, config_id: &str) -> Result<Option<InvalidEntryReport>> {
        let path = self.path_for(config_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::io(&path, e)),
        };
        let tree: Value = serde_json::from_slice(&raw)?;
        InvalidEntryReport::from_tree(&tree).map(Some)
    }
}

/// Counters for one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub deleted: u64,
    pub missing: u64,
    pub refused: u64,
    pub failed: u64,
    pub dirs_removed: u64,
}

/// Delete every pointer named by the configuration's report and prune the
/// directories it leaves empty. Only files carrying the pointer extension
/// are ever deleted.
#[instrument(skip(store, config), fields(config_id = %config.id))]
pub async fn cleanup_invalid(store: &ReportStore, config: &MirrorConfiguration) -> Result<CleanupStats> {
    let report = store
        .load(&config.id)
        .await?
        .ok_or_else(|| SyncError::ReportNotFound {
            config_id: config.id.clone(),
        })?;

    let root = config.target_directory.clone();
    let extension = config.pointer_extension.clone();

    let stats = tokio::task::spawn_blocking(move || delete_entries(&root, &extension, &report)).await?;

    info!(
        deleted = stats.deleted,
        missing = stats.missing,
        refused = stats.refused,
        failed = stats.failed,
        dirs_removed = stats.dirs_removed,
        "Cleanup finished"
    );
    Ok(stats)
}

fn delete_entries(root: &Path, extension: &str, report: &InvalidEntryReport) -> CleanupStats {
    let mut stats = CleanupStats::default();

    for relative in report.entries() {
        if relative.split('/').any(|part| part == "..") {
            warn!(entry = %relative, "Refusing path outside the mirror");
            stats.refused += 1;
            continue;
        }
        let path = local_path(root, relative);
        let is_pointer = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !is_pointer {
            warn!(entry = %relative, "Refusing to delete a non-pointer file");
            stats.refused += 1;
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(entry = %relative, "Deleted invalid pointer");
                stats.deleted += 1;
                if let Some(parent) = path.parent() {
                    stats.dirs_removed += remove_empty_ancestors(root, parent) as u64;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => stats.missing += 1,
            Err(e) => {
                warn!(entry = %relative, error = %e, "Failed to delete invalid pointer");
                stats.failed += 1;
            }
        }
    }

    stats
}
