//! Workspace facade crate.
//!
//! Re-exports the mirroring crates so a host can depend on
//! `strm-mirror-workspace` alone. The `desktop` feature (on by default)
//! adds the reqwest/SQLite bridge implementations.

pub use bridge_traits;
pub use core_runtime;
pub use core_scheduler;
pub use core_sync;
pub use provider_alist;

#[cfg(feature = "desktop")]
pub use bridge_desktop;
