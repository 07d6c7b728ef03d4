//! Helpers shared across commands.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use kernel_inventory::config::ConfigTree;
use kernel_inventory::memo::{Memo, DEFAULT_MEMO_CAPACITY};
use kernel_inventory::settings::{CACHE_DIR_ENV, CONFIG_DIR_ENV, DATA_ROOT_ENV};
use kernel_inventory::InventorySettings;

use crate::error::CliError;

/// Path options given on the command line. They take precedence over the
/// environment and the settings file.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub data_root: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

impl PathOverrides {
    fn lookup(&self, name: &str) -> Option<String> {
        let path = match name {
            DATA_ROOT_ENV => self.data_root.as_ref(),
            CONFIG_DIR_ENV => self.config_dir.as_ref(),
            CACHE_DIR_ENV => self.cache_dir.as_ref(),
            _ => None,
        };
        path.map(|p| p.to_string_lossy().into_owned())
    }
}

/// Resolve settings, letting command-line paths shadow the environment.
pub fn resolve_settings(overrides: &PathOverrides) -> Result<InventorySettings, CliError> {
    let settings = InventorySettings::resolve_with(|name| {
        overrides
            .lookup(name)
            .or_else(|| std::env::var(name).ok().filter(|v| !v.is_empty()))
    })?;
    Ok(settings)
}

/// Memo with its disk tier under the cache directory.
pub fn memo_for(settings: &InventorySettings) -> Arc<Memo> {
    Arc::new(Memo::new(DEFAULT_MEMO_CAPACITY).with_disk_dir(settings.memo_dir()))
}

pub fn load_config(settings: &InventorySettings) -> Result<ConfigTree, CliError> {
    Ok(ConfigTree::load_dir(&settings.config_dir)?)
}

/// Parse every value, accepting comma-separated lists as well as repeats.
pub fn parse_list<T>(values: &[String]) -> Result<Vec<T>, CliError>
where
    T: FromStr,
    CliError: From<T::Err>,
{
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<T>().map_err(CliError::from))
        .collect()
}

/// Print a JSON document to stdout.
pub fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
