//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the mirroring crates:
//! - Mirror configuration model, builder and validation
//! - Configuration persistence through a `SettingsStore`
//! - Runtime state directory layout
//! - Logging and tracing initialisation
//!
//! ## Overview
//!
//! Every other core crate reads a [`MirrorConfiguration`](config::MirrorConfiguration)
//! produced here; nothing downstream mutates it.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    ClassificationRules, ConfigRepository, FileClass, IntervalRange, MirrorConfiguration,
    MirrorConfigurationBuilder, RuntimePaths, SidecarOptions, UpdateMode,
};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
