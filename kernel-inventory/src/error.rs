//! Top-level error type for inventory operations.
//!
//! Each concern has its own error enum ([`ConfigError`], [`StoreError`],
//! [`ToolkitError`], [`SettingsError`]); [`InventoryError`] aggregates them so
//! callers of the public API deal with a single type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::database::StoreError;
pub use crate::settings::SettingsError;
pub use crate::toolkit::ToolkitError;

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Errors that can occur while building or querying the inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Mission configuration could not be loaded or resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The persisted store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The kernel toolkit reported a failure.
    #[error(transparent)]
    Toolkit(#[from] ToolkitError),

    /// Settings could not be resolved.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Query start time is after its stop time.
    #[error("start time ({start}) cannot be greater than stop time ({stop})")]
    InvalidRange { start: f64, stop: f64 },

    /// Kernel type string is not one of the supported types.
    #[error("unsupported kernel type: {0}")]
    UnknownKernelType(String),

    /// Quality string is not one of the supported tiers.
    #[error("unsupported kernel quality: {0}")]
    UnknownQuality(String),

    /// The cache directory failed the pre-flight write probe.
    #[error("cache directory {} is not writable: {source}", path.display())]
    NotWritable { path: PathBuf, source: io::Error },
}
