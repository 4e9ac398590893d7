//! # Remote Snapshot
//!
//! Immutable capture of a remote directory tree, produced by one crawl and
//! read by the synchronizer and the validator.
//!
//! Relative paths used throughout the crate are `/`-separated, have no
//! leading separator, and are measured from the configured remote root.

use chrono::{DateTime, Utc};
use core_runtime::config::FileClass;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bumped whenever the serialized layout changes; older artifacts are
/// treated as absent.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One node of the remote tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    pub is_directory: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_token: Option<String>,
    /// Set for files whose extension matched a classification rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<FileClass>,
    /// Present only for directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<RemoteEntry>>,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, size: u64, class: Option<FileClass>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size,
            modified_at: None,
            sign_token: None,
            class,
            children: None,
        }
    }

    pub fn directory(name: impl Into<String>, children: Vec<RemoteEntry>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size: 0,
            modified_at: None,
            sign_token: None,
            class: None,
            children: Some(children),
        }
    }

    pub fn with_sign(mut self, sign: impl Into<String>) -> Self {
        self.sign_token = Some(sign.into());
        self
    }

    pub fn with_modified(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    pub fn children(&self) -> &[RemoteEntry] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn is_video(&self) -> bool {
        !self.is_directory && self.class == Some(FileClass::Video)
    }

    /// Visit every directory of the subtree (including `self`) with its
    /// relative path; the root directory has an empty path.
    pub fn for_each_directory<'a, F>(&'a self, relative_dir: &str, visit: &mut F)
    where
        F: FnMut(&str, &'a RemoteEntry),
    {
        if !self.is_directory {
            return;
        }
        visit(relative_dir, self);
        for child in self.children() {
            if child.is_directory {
                child.for_each_directory(&join_relative(relative_dir, &child.name), visit);
            }
        }
    }

    /// Every file node of the subtree with its relative path
    pub fn files(&self) -> Vec<(String, &RemoteEntry)> {
        let mut files = Vec::new();
        self.for_each_directory("", &mut |dir, node| {
            for child in node.children() {
                if !child.is_directory {
                    files.push((join_relative(dir, &child.name), child));
                }
            }
        });
        files
    }
}

/// Join a relative directory and a name with `/`
pub fn join_relative(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Whether `path` equals `prefix` or lies beneath it
pub fn is_within(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// A full crawl of one configuration's remote root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub config_id: String,
    pub root_remote_path: String,
    pub captured_at: DateTime<Utc>,
    pub root: RemoteEntry,
    /// Directories whose listing failed after retries. Their subtrees are
    /// missing from `root` and must not be read as "deleted upstream".
    #[serde(default)]
    pub incomplete_paths: Vec<String>,
}

impl Snapshot {
    pub fn new(
        config_id: impl Into<String>,
        root_remote_path: impl Into<String>,
        root: RemoteEntry,
    ) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            config_id: config_id.into(),
            root_remote_path: root_remote_path.into(),
            captured_at: Utc::now(),
            root,
            incomplete_paths: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.incomplete_paths.is_empty()
    }

    /// Whether a relative path lies in a subtree that was not listed
    pub fn is_incomplete_at(&self, relative_path: &str) -> bool {
        self.incomplete_paths
            .iter()
            .any(|prefix| is_within(relative_path, prefix))
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > max_age
    }

    pub fn file_count(&self) -> usize {
        self.root.files().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> RemoteEntry {
        RemoteEntry::directory(
            "",
            vec![
                RemoteEntry::file("a.mp4", 10, Some(FileClass::Video)),
                RemoteEntry::directory(
                    "Show",
                    vec![
                        RemoteEntry::file("e1.mkv", 20, Some(FileClass::Video)),
                        RemoteEntry::file("e1.srt", 1, Some(FileClass::Subtitle)),
                        RemoteEntry::directory("Empty", vec![]),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn test_files_carry_relative_paths() {
        let tree = sample_tree();
        let mut paths: Vec<String> = tree.files().into_iter().map(|(p, _)| p).collect();
        paths.sort();

        assert_eq!(paths, vec!["Show/e1.mkv", "Show/e1.srt", "a.mp4"]);
    }

    #[test]
    fn test_for_each_directory() {
        let tree = sample_tree();
        let mut dirs = Vec::new();
        tree.for_each_directory("", &mut |dir, _| dirs.push(dir.to_string()));

        assert_eq!(dirs, vec!["", "Show", "Show/Empty"]);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("Show/e1.strm", "Show"));
        assert!(is_within("Show", "Show"));
        assert!(!is_within("Shows/e1.strm", "Show"));
        assert!(is_within("anything", ""));
    }

    #[test]
    fn test_staleness() {
        let mut snapshot = Snapshot::new("1", "/movies", sample_tree());
        let now = snapshot.captured_at;
        assert!(!snapshot.is_stale(Duration::from_secs(60), now));

        snapshot.captured_at = now - chrono::Duration::hours(25);
        assert!(snapshot.is_stale(Duration::from_secs(24 * 3600), now));
        assert_eq!(snapshot.file_count(), 3);
    }

    #[test]
    fn test_serialization_omits_absent_children() {
        let json = serde_json::to_value(RemoteEntry::file("a.mp4", 1, Some(FileClass::Video)))
            .unwrap();
        assert!(json.get("children").is_none());
        assert_eq!(json["class"], "video");
    }
}
