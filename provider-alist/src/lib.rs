//! # AList Provider
//!
//! Implements `StorageProvider` for the AList-style file listing API.
//!
//! ## Overview
//!
//! This module provides:
//! - Directory listing through `POST <site>/api/fs/list`
//! - Raw-token authentication with explicit rejection surfaced as
//!   `BridgeError::Unauthorized`
//! - Public download URL construction (`<site>/d/<path>`)
//! - Whole-body downloads of sidecar assets

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{download_url, AlistConnector};
pub use error::{AlistError, Result};
