//! `kinv status`

use kernel_inventory::database::StoreReader;

use super::common::{resolve_settings, PathOverrides};
use crate::error::CliError;

pub fn run(overrides: &PathOverrides) -> Result<(), CliError> {
    let settings = resolve_settings(overrides)?;
    println!("Data root:  {}", settings.data_root.display());
    println!("Config dir: {}", settings.config_dir.display());
    println!("Cache dir:  {}", settings.cache_dir.display());

    let reader = StoreReader::open(&settings.store_path())?;
    let created = reader
        .created_at()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!();
    println!("Database:   {}", reader.path().display());
    println!("Format:     v{}", reader.format_version());
    println!("Created:    {}", created);
    println!("Entries:    {}", reader.keys().count());
    for key in reader.keys() {
        println!("  {:<48} {:>10} bytes", key, reader.entry_len(key).unwrap_or(0));
    }
    Ok(())
}
