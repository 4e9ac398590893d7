//! # Sync & Validation Module
//!
//! Mirrors a remote directory tree into local pointer files and checks that
//! mirror later on.
//!
//! ## Overview
//!
//! This module manages the whole lifecycle of a mirror:
//! - Crawling the remote tree into a [`Snapshot`]
//! - Persisting the latest snapshot per configuration
//! - Writing pointer files and sidecar downloads from a snapshot
//! - Validating the mirror (cache diff or live probes)
//! - Reporting and cleaning up invalid pointers
//!
//! ## Components
//!
//! - **Crawler** (`crawler`): Bounded concurrent remote walk with cancellation
//! - **Snapshot** (`snapshot`): Immutable tree captured by one crawl
//! - **Cache** (`cache`): Latest-only snapshot persistence
//! - **Synchronizer** (`synchronizer`): Pointer creation, sidecars, full-mode pruning
//! - **Download Queue** (`download_queue`): Paced, bounded sidecar fetching
//! - **Validator** (`validator`): FastScan and SlowScan strategies
//! - **Report** (`report`): Invalid-entry report and cleanup
//! - **Maintenance** (`maintenance`): Pointer domain rewrite
//! - **Service** (`service`): Orchestrates runs for one configuration

pub mod cache;
pub mod crawler;
pub mod download_queue;
pub mod error;
pub mod maintenance;
pub mod paths;
pub mod report;
pub mod service;
pub mod snapshot;
pub mod synchronizer;
pub mod validator;

pub use cache::{FileSnapshotCache, MemorySnapshotCache, SnapshotCache};
pub use crawler::{CrawlOutcome, CrawlStats, RemoteTreeCrawler};
pub use download_queue::{DownloadQueue, DownloadStats, DownloadTask};
pub use error::{Result, SyncError};
pub use maintenance::{rewrite_pointer_domain, RewriteStats};
pub use report::{cleanup_invalid, CleanupStats, InvalidEntryReport, ReportStore};
pub use service::{AlistProviderFactory, MirrorService, ProviderFactory, SyncRunOutcome};
pub use snapshot::{RemoteEntry, Snapshot, SNAPSHOT_FORMAT_VERSION};
pub use synchronizer::{expected_pointers, MirrorSynchronizer, SyncStats};
pub use validator::{classify_probe, ProbeVerdict, ScanMode, ValidationOutcome, Validator};
