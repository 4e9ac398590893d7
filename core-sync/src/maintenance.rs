//! Bulk maintenance over an existing mirror.

use crate::error::{Result, SyncError};
use crate::paths::{list_pointer_files, local_path, write_atomic};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub rewritten: u64,
    pub untouched: u64,
    pub failed: u64,
}

/// Replace every occurrence of `old_domain` with `new_domain` inside the
/// pointer files under `root`.
///
/// Used when the remote moves to another host. Files that do not mention
/// the old domain are left as they are; each rewritten pointer is replaced
/// atomically.
#[instrument(skip(root), fields(root = ?root.as_ref()))]
pub async fn rewrite_pointer_domain(
    root: impl AsRef<Path>,
    pointer_extension: &str,
    old_domain: &str,
    new_domain: &str,
) -> Result<RewriteStats> {
    if old_domain.is_empty() {
        return Err(SyncError::Config("Old domain must not be empty".to_string()));
    }

    let root: PathBuf = root.as_ref().to_path_buf();
    if !tokio::fs::metadata(&root)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Err(SyncError::Config(format!(
            "Target directory does not exist: {}",
            root.display()
        )));
    }

    let extension = pointer_extension.to_string();
    let old_domain = old_domain.to_string();
    let new_domain = new_domain.to_string();

    let stats = tokio::task::spawn_blocking(move || {
        let mut stats = RewriteStats::default();
        for relative in list_pointer_files(&root, &extension)? {
            let path = local_path(&root, &relative);
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(pointer = %relative, error = %e, "Failed to read pointer");
                    stats.failed += 1;
                    continue;
                }
            };

            if !content.contains(&old_domain) {
                debug!(pointer = %relative, "Old domain not present");
                stats.untouched += 1;
                continue;
            }

            let updated = content.replace(&old_domain, &new_domain);
            match write_atomic(&path, updated.as_bytes()) {
                Ok(()) => {
                    debug!(pointer = %relative, "Rewrote pointer");
                    stats.rewritten += 1;
                }
                Err(e) => {
                    warn!(pointer = %relative, error = %e, "Failed to rewrite pointer");
                    stats.failed += 1;
                }
            }
        }
        Ok::<_, SyncError>(stats)
    })
    .await??;

    info!(
        rewritten = stats.rewritten,
        untouched = stats.untouched,
        failed = stats.failed,
        "Domain rewrite finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rewrite_replaces_host() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("Show")).unwrap();
        std::fs::write(root.join("Show/e1.strm"), "http://old.lan:5244/d/tv/e1.mkv").unwrap();
        std::fs::write(root.join("other.strm"), "https://elsewhere/d/x.mkv").unwrap();
        std::fs::write(root.join("notes.txt"), "http://old.lan:5244").unwrap();

        let stats = rewrite_pointer_domain(root, "strm", "http://old.lan:5244", "https://new.example.com")
            .await
            .unwrap();

        assert_eq!(
            stats,
            RewriteStats {
                rewritten: 1,
                untouched: 1,
                failed: 0
            }
        );
        assert_eq!(
            std::fs::read_to_string(root.join("Show/e1.strm")).unwrap(),
            "https://new.example.com/d/tv/e1.mkv"
        );
        assert_eq!(
            std::fs::read_to_string(root.join("notes.txt")).unwrap(),
            "http://old.lan:5244"
        );
    }

    #[tokio::test]
    async fn test_rewrite_rejects_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = rewrite_pointer_domain(dir.path().join("nope"), "strm", "a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
