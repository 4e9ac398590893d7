//! AList API connector implementation
//!
//! Implements the `StorageProvider` trait for the AList listing API.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::{RemoteFile, StorageProvider};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::AlistError;
use crate::types::{Envelope, ListData, ListRequest, ObjectInfo};

/// Envelope code for success
const CODE_OK: i64 = 200;

/// Envelope code for a rejected token
const CODE_UNAUTHORIZED: i64 = 401;

/// Timeout for a single listing request
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a sidecar download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the public download URL of a remote file.
///
/// The root keeps its slashes; the relative path is escaped as a single
/// component so its slashes become `%2F`. The sign token is appended only
/// when present and non-empty.
///
/// ```
/// use provider_alist::download_url;
///
/// let url = download_url("https://m.example.com", "/movies", "Sci Fi/Dune.mkv", None);
/// assert_eq!(url, "https://m.example.com/d/movies/Sci%20Fi%2FDune.mkv");
/// ```
pub fn download_url(
    site_url: &str,
    root_path: &str,
    relative_path: &str,
    sign: Option<&str>,
) -> String {
    let root = root_path
        .trim_end_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let mut url = format!(
        "{}/d{}/{}",
        site_url,
        root,
        urlencoding::encode(relative_path)
    );

    if let Some(sign) = sign.filter(|s| !s.is_empty()) {
        url.push_str("?sign=");
        url.push_str(sign);
    }

    url
}

/// AList API connector
///
/// Implements `StorageProvider` for one AList site.
///
/// # Features
///
/// - Whole-directory listing in one request (`per_page = 0`)
/// - Optional server-side listing refresh
/// - Explicit token rejection reported as `BridgeError::Unauthorized`
/// - Transport retries delegated to the injected `HttpClient`
///
/// # Example
///
/// ```ignore
/// use provider_alist::AlistConnector;
/// use bridge_traits::storage::StorageProvider;
///
/// let connector = AlistConnector::new(http_client, "https://media.example.com", token);
/// let children = connector.list_directory("/movies").await?;
/// ```
pub struct AlistConnector {
    http_client: Arc<dyn HttpClient>,
    site_url: String,
    token: String,
    refresh: bool,
}

impl AlistConnector {
    /// Create a new connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `site_url` - Site root without trailing slash
    /// * `token` - Sent verbatim as the `Authorization` header
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        site_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            site_url: site_url.into(),
            token: token.into(),
            refresh: false,
        }
    }

    /// Ask the remote to refresh its own listing cache on every call
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    fn list_url(&self) -> String {
        format!("{}/api/fs/list", self.site_url)
    }

    /// Parse RFC 3339 timestamp
    fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Convert ObjectInfo to RemoteFile
    fn convert_object(object: ObjectInfo) -> RemoteFile {
        RemoteFile {
            modified_at: object.modified.as_deref().and_then(Self::parse_timestamp),
            sign: object.sign.filter(|s| !s.is_empty()),
            name: object.name,
            is_dir: object.is_dir,
            size: object.size,
        }
    }

    fn parse_listing(path: &str, response: &HttpResponse) -> crate::Result<Vec<RemoteFile>> {
        if response.status == 401 || response.status == 403 {
            return Err(AlistError::AuthenticationFailed(format!(
                "HTTP {} listing {}",
                response.status, path
            )));
        }

        if !response.is_success() {
            return Err(AlistError::ApiError {
                code: i64::from(response.status),
                message: String::from_utf8_lossy(&response.body).to_string(),
            });
        }

        let envelope: Envelope<ListData> = serde_json::from_slice(&response.body)
            .map_err(|e| AlistError::ParseError(format!("Failed to parse listing: {}", e)))?;

        match envelope.code {
            CODE_OK => {}
            CODE_UNAUTHORIZED => {
                return Err(AlistError::AuthenticationFailed(envelope.message));
            }
            code => {
                return Err(AlistError::ApiError {
                    code,
                    message: format!("{} ({})", envelope.message, path),
                });
            }
        }

        Ok(envelope
            .data
            .and_then(|data| data.content)
            .unwrap_or_default()
            .into_iter()
            .map(Self::convert_object)
            .collect())
    }
}

#[async_trait]
impl StorageProvider for AlistConnector {
    #[instrument(skip(self), fields(path = %path))]
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteFile>> {
        let request = HttpRequest::new(HttpMethod::Post, self.list_url())
            .authorization(self.token.as_str())
            .json(&ListRequest::new(path, self.refresh))?
            .timeout(LIST_TIMEOUT);

        let response = self.http_client.execute(request).await?;

        match Self::parse_listing(path, &response) {
            Ok(files) => {
                debug!(count = files.len(), "Listed remote directory");
                Ok(files)
            }
            Err(e) => {
                warn!(error = %e, "Listing failed");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, url))]
    async fn download(&self, url: &str) -> Result<Bytes> {
        let request = HttpRequest::new(HttpMethod::Get, url).timeout(DOWNLOAD_TIMEOUT);
        let response = self.http_client.execute(request).await?;

        if response.is_success() {
            debug!(bytes = response.body.len(), "Downloaded remote file");
            Ok(response.body)
        } else {
            Err(BridgeError::OperationFailed(format!(
                "Download failed with HTTP {}",
                response.status
            )))
        }
    }
}
