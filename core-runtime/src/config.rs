//! # Mirror Configuration
//!
//! Describes one sync unit: a remote root on one site mirrored into one local
//! directory, together with the rules that decide which remote files become
//! pointer files and which are fetched as sidecar assets.
//!
//! ## Overview
//!
//! Configurations are created and edited by the host (dashboard, CLI) and
//! stored as JSON through a [`SettingsStore`]. The core only ever reads them.
//! [`MirrorConfiguration::validate`] enforces fail-fast checks so that a
//! malformed configuration is rejected before any network or filesystem I/O.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{MirrorConfiguration, UpdateMode};
//!
//! let config = MirrorConfiguration::builder()
//!     .id("1")
//!     .site_url("https://media.example.com")
//!     .token("alist-token")
//!     .root_path("/movies")
//!     .target_directory("/mnt/strm/movies")
//!     .update_mode(UpdateMode::Full)
//!     .build()?;
//! ```
//!
//! ## Validation
//!
//! ```should_panic
//! use core_runtime::config::MirrorConfiguration;
//!
//! // Paths may not end in a separator
//! let config = MirrorConfiguration::builder()
//!     .id("1")
//!     .site_url("https://media.example.com/")
//!     .token("t")
//!     .root_path("/movies")
//!     .target_directory("/mnt/strm")
//!     .build()
//!     .expect("Should fail - trailing separator");
//! ```

use crate::error::{Error, Result};
use bridge_traits::SettingsStore;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key prefix under which configurations live in the settings store
pub const CONFIG_KEY_PREFIX: &str = "mirror.config.";

/// Environment variable overriding the runtime state directory
pub const HOME_ENV_VAR: &str = "STRM_MIRROR_HOME";

const DEFAULT_HOME: &str = "/config";

/// Category a remote file falls into, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileClass {
    Video,
    Subtitle,
    Image,
    Metadata,
}

/// Extension sets used to classify remote files.
///
/// Extensions are stored lowercase without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRules {
    pub video: Vec<String>,
    pub subtitle: Vec<String>,
    pub image: Vec<String>,
    pub metadata: Vec<String>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            video: to_list(&["mp4", "mkv", "avi", "mov", "flv", "wmv", "ts", "m2ts"]),
            subtitle: to_list(&["srt", "ass", "ssa", "vtt", "sub"]),
            image: to_list(&["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"]),
            metadata: to_list(&["nfo", "xml"]),
        }
    }
}

fn to_list(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl ClassificationRules {
    /// Parse a comma separated extension list such as `".mp4, mkv,.AVI"`
    pub fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(normalize_extension)
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Lowercase every extension and drop leading dots
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.video,
            &mut self.subtitle,
            &mut self.image,
            &mut self.metadata,
        ] {
            *list = list
                .iter()
                .map(|ext| normalize_extension(ext))
                .filter(|ext| !ext.is_empty())
                .collect();
        }
        self
    }

    /// Classify a file name by its last extension. Video wins on overlap.
    pub fn classify(&self, file_name: &str) -> Option<FileClass> {
        let ext = extension_of(file_name)?;
        let matches = |list: &[String]| list.iter().any(|candidate| candidate == &ext);

        if matches(&self.video) {
            Some(FileClass::Video)
        } else if matches(&self.subtitle) {
            Some(FileClass::Subtitle)
        } else if matches(&self.image) {
            Some(FileClass::Image)
        } else if matches(&self.metadata) {
            Some(FileClass::Metadata)
        } else {
            None
        }
    }
}

fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Lowercased extension after the last dot, if any
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// File name without its last extension
pub fn stem_of(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// How the synchronizer treats local entries no longer present upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Only create what is missing; never delete
    #[default]
    Incremental,
    /// Create what is missing and prune stale pointers and empty directories
    Full,
}

/// Randomized pacing interval in whole seconds, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for IntervalRange {
    fn default() -> Self {
        Self {
            min_secs: 1,
            max_secs: 3,
        }
    }
}

impl IntervalRange {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    /// No pacing at all
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Parse `"1-3"` or `"1,3"`
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.replace(',', "-");
        let (min, max) = normalized
            .split_once('-')
            .ok_or_else(|| Error::Config(format!("Invalid interval range: {}", raw)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("Invalid interval range: {}", raw)))
        };
        Ok(Self::new(parse(min)?, parse(max)?))
    }

    /// Swap the bounds if they were entered in the wrong order
    pub fn ordered(self) -> Self {
        if self.min_secs > self.max_secs {
            warn!(
                min = self.min_secs,
                max = self.max_secs,
                "Interval range reversed, swapping bounds"
            );
            Self::new(self.max_secs, self.min_secs)
        } else {
            self
        }
    }

    pub fn is_zero(&self) -> bool {
        self.max_secs == 0
    }

    /// Draw a delay uniformly from the range
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let ordered = self.ordered();
        if ordered.min_secs == ordered.max_secs {
            return Duration::from_secs(ordered.min_secs);
        }
        Duration::from_secs(rng.gen_range(ordered.min_secs..=ordered.max_secs))
    }
}

/// Which sidecar classes the synchronizer downloads next to pointer files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarOptions {
    pub subtitles: bool,
    pub images: bool,
    pub metadata: bool,
    /// Fetch every image of a directory holding videos, stem match or not
    pub folder_images: bool,
}

impl Default for SidecarOptions {
    fn default() -> Self {
        Self {
            subtitles: true,
            images: true,
            metadata: true,
            folder_images: false,
        }
    }
}

impl SidecarOptions {
    pub fn none() -> Self {
        Self {
            subtitles: false,
            images: false,
            metadata: false,
            folder_images: false,
        }
    }

    pub fn allows(&self, class: FileClass) -> bool {
        match class {
            FileClass::Video => false,
            FileClass::Subtitle => self.subtitles,
            FileClass::Image => self.images,
            FileClass::Metadata => self.metadata,
        }
    }

    pub fn any(&self) -> bool {
        self.subtitles || self.images || self.metadata || self.folder_images
    }
}

/// One mirror sync unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfiguration {
    /// Identity used for cache and report artifacts
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Site root, e.g. `https://media.example.com`
    pub site_url: String,
    /// Value sent verbatim in the `Authorization` header
    pub token: String,
    /// Remote directory to mirror, e.g. `/movies`
    pub root_path: String,
    /// Local directory receiving pointer files
    pub target_directory: PathBuf,
    /// Directory names skipped entirely during traversal
    #[serde(default)]
    pub ignored_directories: Vec<String>,
    #[serde(default)]
    pub classification: ClassificationRules,
    /// Concurrent in-flight directory listings
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Concurrent sidecar downloads
    #[serde(default = "default_concurrency")]
    pub download_threads: usize,
    #[serde(default)]
    pub update_mode: UpdateMode,
    /// Append `?sign=<token>` to newly written pointers
    #[serde(default)]
    pub update_existing: bool,
    /// Ask the remote to refresh its own listing cache
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub download_interval: IntervalRange,
    /// Videos smaller than this are excluded from the fast-scan expected set
    #[serde(default = "default_size_threshold")]
    pub size_threshold_bytes: u64,
    #[serde(default = "default_pointer_extension")]
    pub pointer_extension: String,
    #[serde(default)]
    pub sidecars: SidecarOptions,
    /// Age after which a cached snapshot is considered stale
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_secs: u64,
}

fn default_concurrency() -> usize {
    5
}

fn default_size_threshold() -> u64 {
    100 * 1024 * 1024
}

fn default_pointer_extension() -> String {
    "strm".to_string()
}

fn default_cache_max_age() -> u64 {
    24 * 60 * 60
}

impl MirrorConfiguration {
    /// Creates a new builder for constructing a `MirrorConfiguration`.
    pub fn builder() -> MirrorConfigurationBuilder {
        MirrorConfigurationBuilder::default()
    }

    /// Base of the JSON API, `<site_url>/api`
    pub fn api_base(&self) -> String {
        format!("{}/api", self.site_url)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_directories.iter().any(|ignored| ignored == name)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Identity, site, token and paths are present
    /// - The id is usable inside a file name
    /// - No path-like value ends in a separator
    /// - The remote root is absolute
    /// - At least one video extension is configured
    /// - Worker pool sizes are at least one
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("Configuration id cannot be empty".to_string()));
        }
        if self.id.contains(['/', '\\']) || self.id.contains("..") {
            return Err(Error::Config(format!(
                "Configuration id cannot contain path separators or '..': {:?}",
                self.id
            )));
        }
        if self.site_url.is_empty() {
            return Err(Error::Config("site_url cannot be empty".to_string()));
        }
        if self.token.is_empty() {
            return Err(Error::Config("token cannot be empty".to_string()));
        }
        if self.root_path.is_empty() {
            return Err(Error::Config("root_path cannot be empty".to_string()));
        }
        if !self.root_path.starts_with('/') {
            return Err(Error::Config(format!(
                "root_path must be absolute: {}",
                self.root_path
            )));
        }
        if self.target_directory.as_os_str().is_empty() {
            return Err(Error::Config("target_directory cannot be empty".to_string()));
        }

        reject_trailing_separator("site_url", &self.site_url)?;
        if self.root_path != "/" {
            reject_trailing_separator("root_path", &self.root_path)?;
        }
        reject_trailing_separator(
            "target_directory",
            &self.target_directory.to_string_lossy(),
        )?;
        for dir in &self.ignored_directories {
            reject_trailing_separator("ignored_directories", dir)?;
        }

        if self.classification.video.is_empty() {
            return Err(Error::Config(
                "At least one video extension must be configured".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.download_threads == 0 {
            return Err(Error::Config(
                "download_threads must be at least 1".to_string(),
            ));
        }
        if self.pointer_extension.is_empty() || self.pointer_extension.contains('.') {
            return Err(Error::Config(format!(
                "Invalid pointer extension: {:?}",
                self.pointer_extension
            )));
        }

        Ok(())
    }
}

fn reject_trailing_separator(name: &str, value: &str) -> Result<()> {
    if value.ends_with('/') || value.ends_with('\\') {
        return Err(Error::Config(format!(
            "{} must not end with a path separator: {}",
            name, value
        )));
    }
    Ok(())
}

/// Builder for constructing [`MirrorConfiguration`] instances.
///
/// Call [`build()`](MirrorConfigurationBuilder::build) to validate and
/// produce the configuration.
#[derive(Default)]
pub struct MirrorConfigurationBuilder {
    id: Option<String>,
    name: Option<String>,
    site_url: Option<String>,
    token: Option<String>,
    root_path: Option<String>,
    target_directory: Option<PathBuf>,
    ignored_directories: Vec<String>,
    classification: Option<ClassificationRules>,
    concurrency: Option<usize>,
    download_threads: Option<usize>,
    update_mode: UpdateMode,
    update_existing: bool,
    refresh: bool,
    download_interval: Option<IntervalRange>,
    size_threshold_bytes: Option<u64>,
    pointer_extension: Option<String>,
    sidecars: Option<SidecarOptions>,
    cache_max_age_secs: Option<u64>,
}

impl MirrorConfigurationBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn root_path(mut self, path: impl Into<String>) -> Self {
        self.root_path = Some(path.into());
        self
    }

    pub fn target_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.target_directory = Some(path.into());
        self
    }

    pub fn ignore_directory(mut self, name: impl Into<String>) -> Self {
        self.ignored_directories.push(name.into());
        self
    }

    pub fn classification(mut self, rules: ClassificationRules) -> Self {
        self.classification = Some(rules);
        self
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    pub fn download_threads(mut self, threads: usize) -> Self {
        self.download_threads = Some(threads);
        self
    }

    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    pub fn update_existing(mut self, enabled: bool) -> Self {
        self.update_existing = enabled;
        self
    }

    pub fn refresh(mut self, enabled: bool) -> Self {
        self.refresh = enabled;
        self
    }

    pub fn download_interval(mut self, range: IntervalRange) -> Self {
        self.download_interval = Some(range);
        self
    }

    pub fn size_threshold_bytes(mut self, bytes: u64) -> Self {
        self.size_threshold_bytes = Some(bytes);
        self
    }

    pub fn pointer_extension(mut self, ext: impl Into<String>) -> Self {
        self.pointer_extension = Some(ext.into());
        self
    }

    pub fn sidecars(mut self, options: SidecarOptions) -> Self {
        self.sidecars = Some(options);
        self
    }

    pub fn cache_max_age(mut self, age: Duration) -> Self {
        self.cache_max_age_secs = Some(age.as_secs());
        self
    }

    /// Assemble and validate the configuration
    pub fn build(self) -> Result<MirrorConfiguration> {
        let missing = |field: &str| Error::Config(format!("{} is required", field));

        let config = MirrorConfiguration {
            id: self.id.ok_or_else(|| missing("id"))?,
            name: self.name.unwrap_or_default(),
            site_url: self.site_url.ok_or_else(|| missing("site_url"))?,
            token: self.token.ok_or_else(|| missing("token"))?,
            root_path: self.root_path.ok_or_else(|| missing("root_path"))?,
            target_directory: self
                .target_directory
                .ok_or_else(|| missing("target_directory"))?,
            ignored_directories: self.ignored_directories,
            classification: self.classification.unwrap_or_default().normalized(),
            concurrency: self.concurrency.unwrap_or_else(default_concurrency),
            download_threads: self.download_threads.unwrap_or_else(default_concurrency),
            update_mode: self.update_mode,
            update_existing: self.update_existing,
            refresh: self.refresh,
            download_interval: self.download_interval.unwrap_or_default().ordered(),
            size_threshold_bytes: self
                .size_threshold_bytes
                .unwrap_or_else(default_size_threshold),
            pointer_extension: self
                .pointer_extension
                .unwrap_or_else(default_pointer_extension),
            sidecars: self.sidecars.unwrap_or_default(),
            cache_max_age_secs: self.cache_max_age_secs.unwrap_or_else(default_cache_max_age),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Loads and stores configurations through the key-value settings provider.
pub struct ConfigRepository {
    store: Arc<dyn SettingsStore>,
}

impl ConfigRepository {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    fn key(config_id: &str) -> String {
        format!("{}{}", CONFIG_KEY_PREFIX, config_id)
    }

    /// Fetch a configuration if it exists. The result is validated.
    pub async fn get(&self, config_id: &str) -> Result<Option<MirrorConfiguration>> {
        let Some(raw) = self.store.get_string(&Self::key(config_id)).await? else {
            return Ok(None);
        };

        let mut config: MirrorConfiguration = serde_json::from_str(&raw)?;
        config.classification = config.classification.normalized();
        config.download_interval = config.download_interval.ordered();
        config.validate()?;
        Ok(Some(config))
    }

    /// Fetch a configuration, treating absence as an error
    pub async fn load(&self, config_id: &str) -> Result<MirrorConfiguration> {
        self.get(config_id)
            .await?
            .ok_or_else(|| Error::ConfigNotFound(config_id.to_string()))
    }

    /// Validate and persist a configuration, replacing any previous value
    pub async fn save(&self, config: &MirrorConfiguration) -> Result<()> {
        config.validate()?;
        let raw = serde_json::to_string(config)?;
        self.store.set_string(&Self::key(&config.id), &raw).await?;
        debug!(config_id = %config.id, "Saved mirror configuration");
        Ok(())
    }

    pub async fn delete(&self, config_id: &str) -> Result<()> {
        self.store.delete(&Self::key(config_id)).await?;
        Ok(())
    }

    /// Identifiers of every stored configuration
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(CONFIG_KEY_PREFIX).map(str::to_string))
            .collect())
    }
}

/// Layout of the runtime state directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    home: PathBuf,
}

impl RuntimePaths {
    pub fn new<P: Into<PathBuf>>(home: P) -> Self {
        Self { home: home.into() }
    }

    /// Read the home directory from `STRM_MIRROR_HOME`, defaulting to `/config`
    pub fn from_env() -> Self {
        let home = std::env::var_os(HOME_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME));
        Self::new(home)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn settings_db(&self) -> PathBuf {
        self.home.join("settings.db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.home.join("invalid_file_trees")
    }

    /// Default job list file used when the system crontab is not wanted
    pub fn job_list(&self) -> PathBuf {
        self.home.join("jobs.crontab")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn base_builder() -> MirrorConfigurationBuilder {
        MirrorConfiguration::builder()
            .id("1")
            .site_url("https://media.example.com")
            .token("secret")
            .root_path("/movies")
            .target_directory("/mnt/strm/movies")
    }

    #[test]
    fn test_builder_defaults() {
        let config = base_builder().build().unwrap();

        assert_eq!(config.concurrency, 5);
        assert_eq!(config.update_mode, UpdateMode::Incremental);
        assert_eq!(config.pointer_extension, "strm");
        assert_eq!(config.size_threshold_bytes, 100 * 1024 * 1024);
        assert_eq!(config.download_interval, IntervalRange::new(1, 3));
        assert_eq!(config.api_base(), "https://media.example.com/api");
    }

    #[test]
    fn test_trailing_separator_rejected() {
        let err = base_builder().root_path("/movies/").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(base_builder().root_path("/").build().is_ok());

        let err = base_builder()
            .ignore_directory("trash/")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = base_builder()
            .target_directory("/mnt/strm/")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_id_must_be_a_plain_file_name_part() {
        for id in ["../escape", "a/b", "a\\b", ".."] {
            let err = base_builder().id(id).build().unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{}", id);
        }
        assert!(base_builder().id("movies-4k_2").build().is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let err = MirrorConfiguration::builder().id("1").build().unwrap_err();
        assert!(err.to_string().contains("site_url"));
    }

    #[test]
    fn test_empty_video_set_rejected() {
        let rules = ClassificationRules {
            video: vec![],
            ..ClassificationRules::default()
        };
        assert!(base_builder().classification(rules).build().is_err());
    }

    #[test]
    fn test_classification() {
        let rules = ClassificationRules {
            video: ClassificationRules::parse_list(".MP4, mkv"),
            ..ClassificationRules::default()
        };

        assert_eq!(rules.classify("Movie.mp4"), Some(FileClass::Video));
        assert_eq!(rules.classify("movie.MKV"), Some(FileClass::Video));
        assert_eq!(rules.classify("movie.zh.srt"), Some(FileClass::Subtitle));
        assert_eq!(rules.classify("poster.JPG"), Some(FileClass::Image));
        assert_eq!(rules.classify("movie.nfo"), Some(FileClass::Metadata));
        assert_eq!(rules.classify("readme.txt"), None);
        assert_eq!(rules.classify("noextension"), None);
        assert_eq!(rules.classify(".hidden"), None);
    }

    #[test]
    fn test_stem_and_extension() {
        assert_eq!(stem_of("a.b.mp4"), "a.b");
        assert_eq!(stem_of("plain"), "plain");
        assert_eq!(extension_of("a.b.MP4").as_deref(), Some("mp4"));
    }

    #[test]
    fn test_interval_range() {
        assert_eq!(IntervalRange::parse("2-5").unwrap(), IntervalRange::new(2, 5));
        assert_eq!(IntervalRange::parse("2,5").unwrap(), IntervalRange::new(2, 5));
        assert!(IntervalRange::parse("abc").is_err());
        assert_eq!(IntervalRange::new(5, 2).ordered(), IntervalRange::new(2, 5));

        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let delay = IntervalRange::new(1, 3).sample(&mut rng);
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
        }
        assert_eq!(IntervalRange::none().sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_runtime_paths() {
        let paths = RuntimePaths::new("/state");
        assert_eq!(paths.cache_dir(), PathBuf::from("/state/cache"));
        assert_eq!(
            paths.report_dir(),
            PathBuf::from("/state/invalid_file_trees")
        );
    }

    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<BTreeMap<String, String>>,
    }

    #[async_trait]
    impl SettingsStore for MemoryStore {
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

    #[tokio::test]
    async fn test_repository_round_trip() {
        let store = Arc::new(MemoryStore::default());
        store.set_string("unrelated", "x").await.unwrap();
        let repo = ConfigRepository::new(store);

        let config = base_builder().update_mode(UpdateMode::Full).build().unwrap();
        repo.save(&config).await.unwrap();

        assert_eq!(repo.load("1").await.unwrap(), config);
        assert_eq!(repo.list_ids().await.unwrap(), vec!["1"]);

        repo.delete("1").await.unwrap();
        assert!(matches!(
            repo.load("1").await.unwrap_err(),
            Error::ConfigNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_repository_rejects_invalid_stored_value() {
        let store = Arc::new(MemoryStore::default());
        let mut config = base_builder().build().unwrap();
        config.root_path = "/movies/".to_string();
        store
            .set_string("mirror.config.1", &serde_json::to_string(&config).unwrap())
            .await
            .unwrap();

        let repo = ConfigRepository::new(store);
        assert!(matches!(repo.load("1").await.unwrap_err(), Error::Config(_)));
    }
}
