//! Remote Storage and Settings Abstractions
//!
//! Provides platform-agnostic traits for listing a remote file store and for
//! the key-value settings storage that holds mirror configurations.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One entry returned by a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Single path segment
    pub name: String,
    pub is_dir: bool,
    /// Size in bytes (meaningless for directories)
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    /// Access-signing token some remote files require
    pub sign: Option<String>,
}

impl RemoteFile {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size,
            modified_at: None,
            sign: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: 0,
            modified_at: None,
            sign: None,
        }
    }

    pub fn with_sign(mut self, sign: impl Into<String>) -> Self {
        self.sign = Some(sign.into());
        self
    }
}

/// Remote file store trait
///
/// Abstracts the directory-listing API of the remote store so the crawler can
/// be driven by an in-memory tree in tests.
///
/// # Errors
///
/// Implementations must return [`BridgeError::Unauthorized`](crate::BridgeError::Unauthorized)
/// when the remote explicitly rejects the token; callers treat that as fatal.
/// Every other failure is reported as a regular operation failure after the
/// transport has exhausted its retries.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::StorageProvider;
///
/// async fn count(provider: &dyn StorageProvider) -> Result<usize> {
///     Ok(provider.list_directory("/media").await?.len())
/// }
/// ```
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// List the direct children of a remote directory
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteFile>>;

    /// Fetch the full body behind a fully-qualified file URL
    async fn download(&self, url: &str) -> Result<Bytes>;
}

/// Key-value settings storage trait
///
/// Abstracts the persistent configuration provider. Values are opaque
/// strings; structured records are stored as JSON by the caller.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("mirror.config.1", "{...}").await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_file_constructors() {
        let file = RemoteFile::file("a.mp4", 1024).with_sign("abc");
        assert!(!file.is_dir);
        assert_eq!(file.size, 1024);
        assert_eq!(file.sign.as_deref(), Some("abc"));

        let dir = RemoteFile::directory("season 1");
        assert!(dir.is_dir);
        assert!(dir.sign.is_none());
    }
}
