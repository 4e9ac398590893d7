//! # Host Bridge Traits
//!
//! Seams between the mirroring core and the outside world.
//!
//! ## Overview
//!
//! This crate defines the contract between the core crates and their I/O
//! collaborators. Each trait represents a capability the core requires but
//! that is implemented elsewhere (desktop adapters, remote providers, or
//! in-memory fakes in tests).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP with bounded retry
//! - [`StorageProvider`](storage::StorageProvider) - Remote directory listing and downloads
//! - [`SettingsStore`](storage::SettingsStore) - Key-value configuration provider
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should:
//!
//! - Report explicit credential rejection as `BridgeError::Unauthorized`
//! - Convert transport-specific errors to `BridgeError::OperationFailed`
//! - Include context (URL, remote path) in messages
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across the
//! crawler's and downloader's concurrent tasks.

pub mod error;
pub mod http;
pub mod storage;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{RemoteFile, SettingsStore, StorageProvider};
