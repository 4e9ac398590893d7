//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with bounded exponential-backoff retry
//! - `SettingsStore` using a SQLite-backed key-value table
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let settings = SqliteSettingsStore::new("/config/settings.db".into()).await?;
//!     Ok(())
//! }
//! ```

mod http;
mod settings;

pub use http::{ReqwestHttpClient, DEFAULT_USER_AGENT};
pub use settings::SqliteSettingsStore;
