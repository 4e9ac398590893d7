//! Integration tests for the sync and validation workflow
//!
//! These tests drive `MirrorService` end to end against an in-memory remote
//! and a throwaway mirror directory:
//! - Ignored directories never reach the mirror
//! - Authorization failure aborts the run without touching cache or mirror
//! - Incremental runs are idempotent
//! - Full mode deletes stale pointers and emptied directories
//! - A subtree that failed to list is never pruned
//! - FastScan is deterministic and honours the size threshold
//! - Cleanup removes what validation reported

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::storage::{RemoteFile, SettingsStore, StorageProvider};
use bytes::Bytes;
use core_runtime::config::{
    ConfigRepository, IntervalRange, MirrorConfiguration, SidecarOptions, UpdateMode,
};
use core_sync::{
    MemorySnapshotCache, MirrorService, ProviderFactory, ReportStore, ScanMode, Snapshot,
    SnapshotCache, SyncError,
};
use mockall::mock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Fakes
// ============================================================================

/// Remote tree keyed by absolute directory path
#[derive(Default)]
struct InMemoryRemote {
    dirs: Mutex<HashMap<String, Vec<RemoteFile>>>,
    failing: Mutex<Vec<String>>,
    reject_token: AtomicBool,
}

impl InMemoryRemote {
    fn set_dir(&self, path: &str, entries: Vec<RemoteFile>) {
        self.dirs.lock().unwrap().insert(path.to_string(), entries);
    }

    fn fail_dir(&self, path: &str) {
        self.failing.lock().unwrap().push(path.to_string());
    }
}

#[async_trait]
impl StorageProvider for InMemoryRemote {
    async fn list_directory(&self, path: &str) -> BridgeResult<Vec<RemoteFile>> {
        if self.reject_token.load(Ordering::SeqCst) {
            return Err(BridgeError::Unauthorized("token is invalidated".into()));
        }
        if self.failing.lock().unwrap().iter().any(|p| p == path) {
            return Err(BridgeError::OperationFailed("HTTP 502 error".into()));
        }
        Ok(self
            .dirs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn download(&self, url: &str) -> BridgeResult<Bytes> {
        Ok(Bytes::from(format!("body of {}", url)))
    }
}

#[derive(Default)]
struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().unwrap().keys().cloned().collect())
    }
}

struct NoHttp;

#[async_trait]
impl HttpClient for NoHttp {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("network".into()))
    }
}

mock! {
    Cache {}

    #[async_trait]
    impl SnapshotCache for Cache {
        async fn load(&self, config_id: &str) -> core_sync::Result<Option<Snapshot>>;
        async fn store(&self, config_id: &str, snapshot: &Snapshot) -> core_sync::Result<()>;
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    remote: Arc<InMemoryRemote>,
    cache: Arc<dyn SnapshotCache>,
    service: MirrorService,
    mirror: TempDir,
    _state: TempDir,
}

fn config(target: &Path, mode: UpdateMode) -> MirrorConfiguration {
    MirrorConfiguration::builder()
        .id("1")
        .name("Movies")
        .site_url("https://m.example.com")
        .token("secret")
        .root_path("/media")
        .target_directory(target)
        .ignore_directory("trash")
        .update_mode(mode)
        .size_threshold_bytes(1000)
        .download_interval(IntervalRange::none())
        .sidecars(SidecarOptions::none())
        .build()
        .unwrap()
}

async fn harness_with_cache(mode: UpdateMode, cache: Arc<dyn SnapshotCache>) -> Harness {
    let mirror = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let remote = Arc::new(InMemoryRemote::default());

    let configs = ConfigRepository::new(Arc::new(MemorySettings::default()));
    configs.save(&config(mirror.path(), mode)).await.unwrap();

    let provider = Arc::clone(&remote);
    let factory = move |_: &MirrorConfiguration| -> Arc<dyn StorageProvider> {
        Arc::clone(&provider) as Arc<dyn StorageProvider>
    };
    let service = MirrorService::new(
        configs,
        Arc::new(factory) as Arc<dyn ProviderFactory>,
        Arc::new(NoHttp),
        Arc::clone(&cache),
        ReportStore::new(state.path()),
    );

    Harness {
        remote,
        cache,
        service,
        mirror,
        _state: state,
    }
}

async fn harness(mode: UpdateMode) -> Harness {
    harness_with_cache(mode, Arc::new(MemorySnapshotCache::new())).await
}

fn seed_library(remote: &InMemoryRemote) {
    remote.set_dir(
        "/media",
        vec![
            RemoteFile::directory("Movies"),
            RemoteFile::directory("Shows"),
            RemoteFile::directory("trash"),
        ],
    );
    remote.set_dir(
        "/media/Movies",
        vec![
            RemoteFile::file("Heat.mkv", 5000).with_sign("s1"),
            RemoteFile::file("Heat.srt", 10),
        ],
    );
    remote.set_dir(
        "/media/Shows",
        vec![RemoteFile::directory("S01")],
    );
    remote.set_dir(
        "/media/Shows/S01",
        vec![
            RemoteFile::file("e1.mp4", 1000),
            RemoteFile::file("e2.mp4", 999),
        ],
    );
    remote.set_dir("/media/trash", vec![RemoteFile::file("old.mkv", 5000)]);
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn test_sync_mirrors_videos_and_skips_ignored_directories() {
    let h = harness(UpdateMode::Incremental).await;
    seed_library(&h.remote);

    let outcome = h.service.run_sync("1").await.unwrap();

    assert_eq!(outcome.sync.created, 3);
    assert_eq!(outcome.sync.pointers_present, 3);
    assert_eq!(outcome.crawl.entries_ignored, 1);

    let root = h.mirror.path();
    assert!(root.join("Movies/Heat.strm").exists());
    assert!(root.join("Shows/S01/e1.strm").exists());
    assert!(root.join("Shows/S01/e2.strm").exists());
    assert!(!root.join("trash").exists());
    assert!(!root.join("Movies/Heat.srt").exists());

    let url = std::fs::read_to_string(root.join("Movies/Heat.strm")).unwrap();
    assert_eq!(url, "https://m.example.com/d/media/Movies%2FHeat.mkv");

    let cached = h.cache.load("1").await.unwrap().unwrap();
    assert_eq!(cached.file_count(), 4);
}

#[tokio::test]
async fn test_unauthorized_crawl_is_fatal_and_stores_nothing() {
    let mut cache = MockCache::new();
    cache.expect_store().never();
    cache.expect_load().never();

    let h = harness_with_cache(UpdateMode::Full, Arc::new(cache)).await;
    seed_library(&h.remote);
    h.remote.reject_token.store(true, Ordering::SeqCst);

    let err = h.service.run_sync("1").await.unwrap_err();

    assert!(matches!(err, SyncError::Unauthorized(_)));
    assert!(err.is_fatal());
    assert_eq!(std::fs::read_dir(h.mirror.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_incremental_sync_is_idempotent() {
    let h = harness(UpdateMode::Incremental).await;
    seed_library(&h.remote);

    h.service.run_sync("1").await.unwrap();
    let before = std::fs::read_to_string(h.mirror.path().join("Movies/Heat.strm")).unwrap();

    // A vanished remote file keeps its pointer in incremental mode
    h.remote.set_dir("/media/Shows/S01", vec![RemoteFile::file("e1.mp4", 1000)]);
    let second = h.service.run_sync("1").await.unwrap();

    assert_eq!(second.sync.created, 0);
    assert_eq!(second.sync.skipped, 2);
    assert_eq!(second.sync.deleted_pointers, 0);
    assert!(h.mirror.path().join("Shows/S01/e2.strm").exists());
    assert_eq!(
        std::fs::read_to_string(h.mirror.path().join("Movies/Heat.strm")).unwrap(),
        before
    );
}

#[tokio::test]
async fn test_full_sync_removes_stale_pointers_and_empty_directories() {
    let h = harness(UpdateMode::Full).await;
    seed_library(&h.remote);
    h.service.run_sync("1").await.unwrap();

    h.remote.set_dir(
        "/media",
        vec![RemoteFile::directory("Movies"), RemoteFile::directory("trash")],
    );
    let outcome = h.service.run_sync("1").await.unwrap();

    assert_eq!(outcome.sync.deleted_pointers, 2);
    assert!(outcome.sync.deleted_dirs >= 1);
    assert!(!h.mirror.path().join("Shows").exists());
    assert!(h.mirror.path().join("Movies/Heat.strm").exists());
    assert_eq!(outcome.sync.pointers_present, 1);
}

#[tokio::test]
async fn test_full_sync_keeps_subtrees_that_failed_to_list() {
    let h = harness(UpdateMode::Full).await;
    seed_library(&h.remote);
    h.service.run_sync("1").await.unwrap();

    h.remote.fail_dir("/media/Shows");
    let outcome = h.service.run_sync("1").await.unwrap();

    assert_eq!(outcome.crawl.directories_failed, 1);
    assert_eq!(outcome.sync.deleted_pointers, 0);
    assert!(h.mirror.path().join("Shows/S01/e1.strm").exists());
    assert!(h.mirror.path().join("Shows/S01/e2.strm").exists());
}

#[tokio::test]
async fn test_root_listing_failure_aborts_sync() {
    let h = harness(UpdateMode::Full).await;
    h.remote.fail_dir("/media");

    let err = h.service.run_sync("1").await.unwrap_err();
    assert!(matches!(err, SyncError::Provider(_)));
    assert!(!err.is_fatal());
    assert!(h.cache.load("1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_configuration_is_a_config_error() {
    let h = harness(UpdateMode::Incremental).await;
    let err = h.service.run_sync("42").await.unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_fast_scan_is_deterministic_and_applies_threshold() {
    let h = harness(UpdateMode::Incremental).await;
    seed_library(&h.remote);
    h.service.run_sync("1").await.unwrap();

    // e2.mp4 is 999 bytes, one below the threshold: its pointer is unexpected.
    // e1.mp4 is exactly at the threshold and stays expected.
    let first = h.service.run_validate("1", ScanMode::Fast).await.unwrap();
    let second = h.service.run_validate("1", ScanMode::Fast).await.unwrap();

    let invalid: Vec<&str> = first.report.entries().iter().map(String::as_str).collect();
    assert_eq!(invalid, vec!["Shows/S01/e2.strm"]);
    assert_eq!(first.report, second.report);
    assert!(!first.snapshot_refreshed);
}

#[tokio::test]
async fn test_fast_scan_refreshes_missing_cache() {
    let h = harness(UpdateMode::Incremental).await;
    seed_library(&h.remote);

    let outcome = h.service.run_validate("1", ScanMode::Fast).await.unwrap();

    assert!(outcome.snapshot_refreshed);
    assert!(h.cache.load("1").await.unwrap().is_some());
    let invalid: Vec<&str> = outcome.report.entries().iter().map(String::as_str).collect();
    assert_eq!(invalid, vec!["Movies/Heat.strm", "Shows/S01/e1.strm"]);
}

#[tokio::test]
async fn test_cleanup_removes_reported_pointers() {
    let h = harness(UpdateMode::Incremental).await;
    seed_library(&h.remote);
    h.service.run_sync("1").await.unwrap();

    h.remote.set_dir("/media/Shows/S01", vec![]);
    std::fs::write(h.mirror.path().join("Shows/S01/notes.txt"), "keep").unwrap();
    h.service.run_sync("1").await.unwrap();

    let report = h.service.run_validate("1", ScanMode::Fast).await.unwrap();
    assert_eq!(report.report.len(), 2);

    let stats = h.service.cleanup("1").await.unwrap();
    assert_eq!(stats.deleted, 2);
    assert!(!h.mirror.path().join("Shows/S01/e1.strm").exists());
    assert!(h.mirror.path().join("Shows/S01/notes.txt").exists());
    assert!(h.mirror.path().join("Movies/Heat.strm").exists());
}

#[tokio::test]
async fn test_cleanup_prunes_emptied_directories() {
    let h = harness(UpdateMode::Incremental).await;
    seed_library(&h.remote);
    h.service.run_sync("1").await.unwrap();

    h.remote.set_dir("/media", vec![RemoteFile::directory("Movies")]);
    h.service.run_sync("1").await.unwrap();
    h.service.run_validate("1", ScanMode::Fast).await.unwrap();

    let stats = h.service.cleanup("1").await.unwrap();
    assert_eq!(stats.deleted, 2);
    assert_eq!(stats.dirs_removed, 2);
    assert!(!h.mirror.path().join("Shows").exists());
}
