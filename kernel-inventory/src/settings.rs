//! Inventory settings: where the data, mission configs and database live.
//!
//! Settings are resolved once, from (lowest to highest precedence) built-in
//! defaults, an optional INI file and environment variables, then passed
//! explicitly to whatever needs them.
//!
//! ```ini
//! [paths]
//! data_root = /data/spice
//! config_dir = /data/spice/config
//! cache_dir = /var/cache/kernel-inventory
//! ```

use std::io;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::debug;

/// File name of the persisted database inside the cache directory.
pub const STORE_FILE_NAME: &str = "kernel_inventory.db";

/// Environment variable naming an alternative settings file.
pub const SETTINGS_ENV: &str = "KINV_SETTINGS";
pub const DATA_ROOT_ENV: &str = "KINV_DATA_ROOT";
pub const CONFIG_DIR_ENV: &str = "KINV_CONFIG_DIR";
pub const CACHE_DIR_ENV: &str = "KINV_CACHE_DIR";

/// Legacy data root variables, checked in order after the settings file.
pub const LEGACY_DATA_ROOT_ENVS: [&str; 3] = ["SPICEROOT", "ALESPICEROOT", "ISISDATA"];

const INI_SECTION: &str = "paths";

/// Errors resolving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be parsed.
    #[error("failed to read settings file {}: {reason}", path.display())]
    SettingsFile { path: PathBuf, reason: String },

    /// No data root was configured anywhere.
    #[error("no data root configured; set {DATA_ROOT_ENV}, SPICEROOT, ALESPICEROOT or ISISDATA")]
    NoDataRoot,

    /// The configured data root is not a directory.
    #[error("data root {} is not a directory", .0.display())]
    DataRootMissing(PathBuf),

    /// The cache directory could not be created.
    #[error("failed to prepare cache directory {}: {source}", path.display())]
    CacheDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolved inventory locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySettings {
    /// Root of the kernel data tree; stored paths are relative to it.
    pub data_root: PathBuf,
    /// Directory of `<mission>.json` config files.
    pub config_dir: PathBuf,
    /// Directory holding the database and disk memo entries.
    pub cache_dir: PathBuf,
}

impl InventorySettings {
    /// Settings rooted at `data_root`, with configs in `<data_root>/config`
    /// and the cache in the system temp directory.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            config_dir: data_root.join("config"),
            cache_dir: std::env::temp_dir().join("kernel-inventory"),
            data_root,
        }
    }

    pub fn with_data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_root = path.into();
        self
    }

    pub fn with_config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_dir = path.into();
        self
    }

    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// Location of the persisted database.
    pub fn store_path(&self) -> PathBuf {
        self.cache_dir.join(STORE_FILE_NAME)
    }

    /// Location of the on-disk memo tier.
    pub fn memo_dir(&self) -> PathBuf {
        self.cache_dir.join("memo")
    }

    /// Resolve settings from the process environment and settings file.
    pub fn resolve() -> Result<Self, SettingsError> {
        Self::resolve_with(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Resolve settings with `env` standing in for the process environment.
    pub fn resolve_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let file = match env(SETTINGS_ENV) {
            Some(path) => Some(read_ini(Path::new(&path))?),
            None => match default_settings_path() {
                Some(path) if path.is_file() => Some(read_ini(&path)?),
                _ => None,
            },
        };
        let from_file = |key: &str| -> Option<PathBuf> {
            file.as_ref()?
                .section(Some(INI_SECTION))?
                .get(key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| PathBuf::from(v.trim()))
        };

        let data_root = env(DATA_ROOT_ENV)
            .map(PathBuf::from)
            .or_else(|| from_file("data_root"))
            .or_else(|| {
                LEGACY_DATA_ROOT_ENVS
                    .iter()
                    .filter_map(|name| env(name).map(PathBuf::from))
                    .find(|p| p.is_dir())
            })
            .ok_or(SettingsError::NoDataRoot)?;
        if !data_root.is_dir() {
            return Err(SettingsError::DataRootMissing(data_root));
        }

        let config_dir = env(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| from_file("config_dir"))
            .unwrap_or_else(|| data_root.join("config"));

        let cache_dir = match env(CACHE_DIR_ENV).map(PathBuf::from).or_else(|| from_file("cache_dir")) {
            Some(dir) => {
                std::fs::create_dir_all(&dir).map_err(|source| SettingsError::CacheDir {
                    path: dir.clone(),
                    source,
                })?;
                dir
            }
            None => random_cache_dir()?,
        };

        let settings = Self {
            data_root,
            config_dir,
            cache_dir,
        };
        debug!(
            data_root = %settings.data_root.display(),
            config_dir = %settings.config_dir.display(),
            cache_dir = %settings.cache_dir.display(),
            "Resolved inventory settings"
        );
        Ok(settings)
    }
}

/// `~/.kernel-inventory/config.ini`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".kernel-inventory").join("config.ini"))
}

fn read_ini(path: &Path) -> Result<Ini, SettingsError> {
    Ini::load_from_file(path).map_err(|e| SettingsError::SettingsFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn random_cache_dir() -> Result<PathBuf, SettingsError> {
    let dir = tempfile::Builder::new()
        .prefix("kernel-inventory-")
        .tempdir()
        .map_err(|source| SettingsError::CacheDir {
            path: std::env::temp_dir(),
            source,
        })?;
    Ok(dir.keep())
}
