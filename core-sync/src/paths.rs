//! Local mirror layout helpers.
//!
//! All functions here are blocking filesystem walks; async callers run them
//! through `tokio::task::spawn_blocking`.

use crate::error::{Result, SyncError};
use crate::snapshot::join_relative;
use core_runtime::config::stem_of;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Relative pointer path for a relative video path:
/// `Show/e1.mkv` with extension `strm` becomes `Show/e1.strm`.
pub fn pointer_relative_path(relative_video_path: &str, pointer_extension: &str) -> String {
    let (dir, name) = match relative_video_path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", relative_video_path),
    };
    join_relative(dir, &format!("{}.{}", stem_of(name), pointer_extension))
}

/// Turn a `/`-separated relative path into a path under `root`
pub fn local_path(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Express `path` relative to `root` with `/` separators
pub fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Every pointer file under `root`, as sorted relative paths.
///
/// A missing root yields an empty set.
pub fn list_pointer_files(root: &Path, pointer_extension: &str) -> Result<BTreeSet<String>> {
    let mut pointers = BTreeSet::new();
    if !root.exists() {
        return Ok(pointers);
    }

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable mirror entry");
                continue;
            }
        };
        if entry.file_type().is_file() && has_extension(entry.path(), pointer_extension) {
            if let Some(relative) = relative_to(root, entry.path()) {
                pointers.insert(relative);
            }
        }
    }

    debug!(count = pointers.len(), root = ?root, "Listed local pointer files");
    Ok(pointers)
}

/// Remove every directory under `root` that has no pointer file anywhere
/// beneath it. `root` itself is never removed; directories for which
/// `protect` returns true are left alone.
///
/// Returns the number of directories removed.
pub fn prune_pointerless_dirs<F>(root: &Path, pointer_extension: &str, protect: F) -> Result<usize>
where
    F: Fn(&str) -> bool,
{
    if !root.exists() {
        return Ok(0);
    }

    let pointers = list_pointer_files(root, pointer_extension)?;
    let mut occupied: BTreeSet<String> = BTreeSet::new();
    for pointer in &pointers {
        let mut current = pointer.as_str();
        while let Some((parent, _)) = current.rsplit_once('/') {
            occupied.insert(parent.to_string());
            current = parent;
        }
    }

    let mut removed = 0;
    let mut walker = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable mirror entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(relative) = relative_to(root, entry.path()) else {
            continue;
        };
        if occupied.contains(&relative) || protect(&relative) {
            continue;
        }

        match fs::remove_dir_all(entry.path()) {
            Ok(()) => {
                debug!(dir = %relative, "Removed directory without pointers");
                removed += 1;
            }
            Err(e) => warn!(dir = %relative, error = %e, "Failed to remove directory"),
        }
        walker.skip_current_dir();
    }

    Ok(removed)
}

/// Remove empty directories from `start` upwards, stopping at `root`
pub fn remove_empty_ancestors(root: &Path, start: &Path) -> usize {
    let mut removed = 0;
    let mut current = start.to_path_buf();
    while current != root && current.starts_with(root) {
        let is_empty = fs::read_dir(&current)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty || fs::remove_dir(&current).is_err() {
            break;
        }
        removed += 1;
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
    removed
}

/// Write `contents` to `path` through a sibling temp file and a rename.
/// Each call uses its own temp file, so concurrent writers never share one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));
    let written = fs::write(&temp, contents)
        .map_err(|e| SyncError::io(&temp, e))
        .and_then(|_| fs::rename(&temp, path).map_err(|e| SyncError::io(path, e)));
    if written.is_err() {
        let _ = fs::remove_file(&temp);
    }
    written
}
