//! # Mirror Validator
//!
//! Finds pointer files that no longer lead anywhere. Two strategies exist:
//!
//! - [`ScanMode::Fast`] diffs the cached snapshot against the local mirror
//!   without touching the media endpoint. The cache is refreshed first when
//!   missing or older than `cache_max_age`.
//! - [`ScanMode::Slow`] reads every pointer and probes its URL, one request
//!   at a time with a random pause in between.
//!
//! Either way the result is written as the configuration's
//! [`InvalidEntryReport`], replacing the previous one. A cancelled run
//! leaves the previous report in place.
//!
//! The slow-scan verdict is a heuristic over the response head, not a
//! protocol guarantee. See [`classify_probe`].

use crate::cache::SnapshotCache;
use crate::crawler::RemoteTreeCrawler;
use crate::error::{Result, SyncError};
use crate::paths::{list_pointer_files, local_path};
use crate::report::{InvalidEntryReport, ReportStore};
use crate::snapshot::Snapshot;
use crate::synchronizer::expected_pointers;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::StorageProvider;
use chrono::Utc;
use core_runtime::config::MirrorConfiguration;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Bytes of each probed body that are inspected
pub const PROBE_BODY_LIMIT: usize = 64 * 1024;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

static ANCHOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a href=".*">.*</a>"#).unwrap());

static STATUS_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}\s+\w+").unwrap());

/// Validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    Fast,
    Slow,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Slow => "slow",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "quick" => Ok(Self::Fast),
            "slow" => Ok(Self::Slow),
            other => Err(format!("Unknown scan mode: {}", other)),
        }
    }
}

/// Verdict for one probed pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Valid,
    Invalid,
}

/// Classify the head of a probe response.
///
/// Binary or streaming content and anchor redirect pages are valid. A
/// status-line-shaped text or a JSON object with a `code` field is invalid.
/// Anything else is given the benefit of the doubt.
pub fn classify_probe(response: &HttpResponse) -> ProbeVerdict {
    if let Some(content_type) = response.content_type() {
        if content_type.starts_with("video/")
            || content_type.starts_with("audio/")
            || content_type == "application/octet-stream"
        {
            return ProbeVerdict::Valid;
        }
    }

    let Ok(text) = std::str::from_utf8(&response.body) else {
        return ProbeVerdict::Valid;
    };

    if ANCHOR_REGEX.is_match(text) {
        return ProbeVerdict::Valid;
    }
    if STATUS_LINE_REGEX.is_match(text) {
        return ProbeVerdict::Invalid;
    }

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) if map.contains_key("code") => ProbeVerdict::Invalid,
        _ => ProbeVerdict::Valid,
    }
}

/// Result of one validation run
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub mode: ScanMode,
    pub report: InvalidEntryReport,
    pub report_path: PathBuf,
    /// Pointers examined
    pub checked: u64,
    /// Slow scan only: probes that failed in transport and got no verdict
    pub unverified: u64,
    /// Fast scan only: a fresh crawl replaced the cached snapshot
    pub snapshot_refreshed: bool,
}

#[derive(Debug, Default)]
struct ScanResult {
    invalid: BTreeSet<String>,
    checked: u64,
    unverified: u64,
    snapshot_refreshed: bool,
}

pub struct Validator {
    provider: Arc<dyn StorageProvider>,
    http: Arc<dyn HttpClient>,
    cache: Arc<dyn SnapshotCache>,
    reports: ReportStore,
    cancellation: CancellationToken,
}

impl Validator {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        http: Arc<dyn HttpClient>,
        cache: Arc<dyn SnapshotCache>,
        reports: ReportStore,
    ) -> Self {
        Self {
            provider,
            http,
            cache,
            reports,
            cancellation: CancellationToken::new(),
        }
    }

    /// Abort the snapshot refresh and the probe loop when the token is
    /// cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Run one strategy and overwrite the configuration's report.
    ///
    /// # Errors
    ///
    /// Configuration and authorization errors are fatal, and cancellation
    /// returns `SyncError::Cancelled` without writing a report. Per-pointer
    /// problems never fail the run.
    #[instrument(skip(self, config), fields(config_id = %config.id, mode = %mode))]
    pub async fn validate(
        &self,
        config: &MirrorConfiguration,
        mode: ScanMode,
    ) -> Result<ValidationOutcome> {
        config.validate()?;

        let result = match mode {
            ScanMode::Fast => self.fast_scan(config).await?,
            ScanMode::Slow => self.slow_scan(config).await?,
        };

        let report = InvalidEntryReport::new(result.invalid);
        let report_path = self.reports.write(&config.id, &report).await?;

        info!(
            checked = result.checked,
            invalid = report.len(),
            unverified = result.unverified,
            "Validation finished"
        );

        Ok(ValidationOutcome {
            mode,
            report,
            report_path,
            checked: result.checked,
            unverified: result.unverified,
            snapshot_refreshed: result.snapshot_refreshed,
        })
    }

    async fn fast_scan(&self, config: &MirrorConfiguration) -> Result<ScanResult> {
        let (snapshot, refreshed) = self.current_snapshot(config).await?;

        let root = config.target_directory.clone();
        let extension = config.pointer_extension.clone();
        let actual = tokio::task::spawn_blocking(move || list_pointer_files(&root, &extension))
            .await??;

        let mut result = ScanResult {
            checked: actual.len() as u64,
            snapshot_refreshed: refreshed,
            ..ScanResult::default()
        };

        let Some(snapshot) = snapshot else {
            warn!(
                pointers = actual.len(),
                "No snapshot available, every local pointer is invalid"
            );
            result.invalid = actual;
            return Ok(result);
        };

        let expected = expected_pointers(
            &snapshot,
            &config.pointer_extension,
            config.size_threshold_bytes,
        );

        let orphaned = actual.difference(&expected);
        let missing = expected.difference(&actual);
        result.invalid = orphaned
            .chain(missing)
            .filter(|path| !snapshot.is_incomplete_at(path))
            .cloned()
            .collect();

        debug!(
            expected = expected.len(),
            actual = actual.len(),
            invalid = result.invalid.len(),
            "Fast scan diff computed"
        );
        Ok(result)
    }

    /// Cached snapshot, refreshed by a crawl when missing or stale. A failed
    /// refresh falls back to the stale copy, except on authorization errors.
    async fn current_snapshot(
        &self,
        config: &MirrorConfiguration,
    ) -> Result<(Option<Snapshot>, bool)> {
        let cached = match self.cache.load(&config.id).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Snapshot cache unreadable, treating as missing");
                None
            }
        };

        let fresh_enough = cached
            .as_ref()
            .is_some_and(|s| !s.is_stale(config.cache_max_age(), Utc::now()));
        if fresh_enough {
            return Ok((cached, false));
        }

        info!(cached = cached.is_some(), "Refreshing snapshot before fast scan");
        let crawler = RemoteTreeCrawler::new(Arc::clone(&self.provider), config)
            .with_cancellation(self.cancellation.child_token());
        match crawler.crawl().await {
            Ok(outcome) => {
                self.cache.store(&config.id, &outcome.snapshot).await?;
                Ok((Some(outcome.snapshot), true))
            }
            Err(e @ (SyncError::Unauthorized(_) | SyncError::Cancelled)) => Err(e),
            Err(e) => {
                warn!(error = %e, stale = cached.is_some(), "Snapshot refresh failed");
                Ok((cached, false))
            }
        }
    }

    async fn slow_scan(&self, config: &MirrorConfiguration) -> Result<ScanResult> {
        let root = config.target_directory.clone();
        let extension = config.pointer_extension.clone();
        let pointers = {
            let root = root.clone();
            tokio::task::spawn_blocking(move || list_pointer_files(&root, &extension)).await??
        };

        let mut result = ScanResult::default();
        let total = pointers.len();

        for (index, relative) in pointers.into_iter().enumerate() {
            if self.cancellation.is_cancelled() {
                info!(checked = result.checked, total, "Slow scan cancelled");
                return Err(SyncError::Cancelled);
            }
            if index > 0 {
                let delay = config.download_interval.sample(&mut rand::thread_rng());
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancellation.cancelled() => return Err(SyncError::Cancelled),
                    }
                }
            }
            result.checked += 1;

            let path = local_path(&root, &relative);
            let url = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content.trim().to_string(),
                Err(e) => {
                    warn!(pointer = %relative, error = %e, "Failed to read pointer");
                    result.unverified += 1;
                    continue;
                }
            };

            if url.is_empty() {
                debug!(pointer = %relative, "Empty pointer");
                result.invalid.insert(relative);
                continue;
            }

            let request = HttpRequest::new(HttpMethod::Get, url.as_str()).timeout(PROBE_TIMEOUT);
            let probed = tokio::select! {
                probed = self.http.probe(request, PROBE_BODY_LIMIT) => probed,
                _ = self.cancellation.cancelled() => return Err(SyncError::Cancelled),
            };
            match probed {
                Ok(response) => {
                    let verdict = classify_probe(&response);
                    debug!(
                        pointer = %relative,
                        status = response.status,
                        verdict = ?verdict,
                        progress = format!("{}/{}", index + 1, total),
                        "Probed pointer"
                    );
                    if verdict == ProbeVerdict::Invalid {
                        result.invalid.insert(relative);
                    }
                }
                Err(e) if e.is_unauthorized() => return Err(e.into()),
                Err(e) => {
                    warn!(pointer = %relative, error = %e, "Probe failed, leaving unverified");
                    result.unverified += 1;
                }
            }
        }

        Ok(result)
    }
}
