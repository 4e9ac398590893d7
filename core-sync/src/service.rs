//! # Mirror Service
//!
//! Entry points for one configuration: sync, validate, cleanup and domain
//! rewrite.
//!
//! ## Overview
//!
//! `MirrorService` wires the pieces of this crate together:
//! - Loads the [`MirrorConfiguration`] through a [`ConfigRepository`]
//! - Connects a [`StorageProvider`] for that configuration
//! - Crawls the remote tree with [`RemoteTreeCrawler`]
//! - Stores the snapshot in the [`SnapshotCache`] once the crawl succeeds
//! - Writes the mirror with [`MirrorSynchronizer`]
//! - Runs the [`Validator`] and [`cleanup_invalid`]
//!
//! ## Workflow
//!
//! ### Sync
//! 1. Load and validate the configuration
//! 2. Crawl the remote root (authorization failure aborts, nothing stored)
//! 3. Store the snapshot, replacing the previous one
//! 4. Synchronize the local mirror from the snapshot
//!
//! ### Validate
//! 1. Load and validate the configuration
//! 2. Run the requested strategy
//! 3. Overwrite the invalid-entry report
//!
//! ## Usage
//!
//! ```rust,ignore
//! let service = MirrorService::new(configs, Arc::new(AlistProviderFactory::new(http.clone())), http, cache, reports);
//! let outcome = service.run_sync("1").await?;
//! println!("created {}", outcome.sync.created);
//! ```

use crate::cache::SnapshotCache;
use crate::crawler::{CrawlStats, RemoteTreeCrawler};
use crate::error::Result;
use crate::maintenance::{rewrite_pointer_domain, RewriteStats};
use crate::report::{cleanup_invalid, CleanupStats, ReportStore};
use crate::synchronizer::{MirrorSynchronizer, SyncStats};
use crate::validator::{ScanMode, ValidationOutcome, Validator};
use bridge_traits::http::HttpClient;
use bridge_traits::storage::StorageProvider;
use core_runtime::config::{ConfigRepository, MirrorConfiguration};
use provider_alist::AlistConnector;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Builds the remote connector for a configuration
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, config: &MirrorConfiguration) -> Arc<dyn StorageProvider>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&MirrorConfiguration) -> Arc<dyn StorageProvider> + Send + Sync,
{
    fn connect(&self, config: &MirrorConfiguration) -> Arc<dyn StorageProvider> {
        self(config)
    }
}

/// Connects to the listing API of the configured site
pub struct AlistProviderFactory {
    http: Arc<dyn HttpClient>,
}

impl AlistProviderFactory {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

impl ProviderFactory for AlistProviderFactory {
    fn connect(&self, config: &MirrorConfiguration) -> Arc<dyn StorageProvider> {
        Arc::new(
            AlistConnector::new(Arc::clone(&self.http), config.site_url.clone(), config.token.clone())
                .with_refresh(config.refresh),
        )
    }
}

/// Result of a sync run
#[derive(Debug, Clone)]
pub struct SyncRunOutcome {
    pub crawl: CrawlStats,
    pub sync: SyncStats,
}

pub struct MirrorService {
    configs: ConfigRepository,
    providers: Arc<dyn ProviderFactory>,
    http: Arc<dyn HttpClient>,
    cache: Arc<dyn SnapshotCache>,
    reports: ReportStore,
    cancellation: CancellationToken,
}

impl MirrorService {
    pub fn new(
        configs: ConfigRepository,
        providers: Arc<dyn ProviderFactory>,
        http: Arc<dyn HttpClient>,
        cache: Arc<dyn SnapshotCache>,
        reports: ReportStore,
    ) -> Self {
        Self {
            configs,
            providers,
            http,
            cache,
            reports,
            cancellation: CancellationToken::new(),
        }
    }

    /// Token that aborts a running sync or validation when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub async fn configuration(&self, config_id: &str) -> Result<MirrorConfiguration> {
        Ok(self.configs.load(config_id).await?)
    }

    /// Crawl, cache and synchronize a stored configuration
    pub async fn run_sync(&self, config_id: &str) -> Result<SyncRunOutcome> {
        let config = self.configuration(config_id).await?;
        self.sync(&config).await
    }

    #[instrument(skip(self, config), fields(config_id = %config.id))]
    pub async fn sync(&self, config: &MirrorConfiguration) -> Result<SyncRunOutcome> {
        config.validate()?;
        let provider = self.providers.connect(config);

        let crawl = RemoteTreeCrawler::new(Arc::clone(&provider), config)
            .with_cancellation(self.cancellation.child_token())
            .crawl()
            .await?;

        self.cache.store(&config.id, &crawl.snapshot).await?;

        let sync = MirrorSynchronizer::new(provider)
            .with_cancellation(self.cancellation.child_token())
            .synchronize(config, &crawl.snapshot)
            .await?;

        info!(
            files = crawl.stats.files,
            failed_directories = crawl.stats.directories_failed,
            created = sync.created,
            present = sync.pointers_present,
            "Sync run finished"
        );

        Ok(SyncRunOutcome {
            crawl: crawl.stats,
            sync,
        })
    }

    pub async fn run_validate(&self, config_id: &str, mode: ScanMode) -> Result<ValidationOutcome> {
        let config = self.configuration(config_id).await?;
        self.validate(&config, mode).await
    }

    pub async fn validate(
        &self,
        config: &MirrorConfiguration,
        mode: ScanMode,
    ) -> Result<ValidationOutcome> {
        let validator = Validator::new(
            self.providers.connect(config),
            Arc::clone(&self.http),
            Arc::clone(&self.cache),
            self.reports.clone(),
        )
        .with_cancellation(self.cancellation.child_token());
        validator.validate(config, mode).await
    }

    /// Delete the pointers named by the last validation report
    pub async fn cleanup(&self, config_id: &str) -> Result<CleanupStats> {
        let config = self.configuration(config_id).await?;
        cleanup_invalid(&self.reports, &config).await
    }

    pub async fn rewrite_domain(
        &self,
        config_id: &str,
        old_domain: &str,
        new_domain: &str,
    ) -> Result<RewriteStats> {
        let config = self.configuration(config_id).await?;
        rewrite_pointer_domain(
            &config.target_directory,
            &config.pointer_extension,
            old_domain,
            new_domain,
        )
        .await
    }
}
