//! `kinv config`

use clap::Subcommand;
use kernel_inventory::paths::KernelFs;

use super::common::{load_config, memo_for, print_json, resolve_settings, PathOverrides};
use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// List configured missions and instruments
    Missions,

    /// Expand a config key or JSON pointer into kernel file lists
    Resolve {
        /// Top-level key (e.g. lro) or JSON pointer (e.g. /lro/ck)
        pointer: String,

        /// Keep only the newest version of each kernel
        #[arg(long)]
        latest: bool,

        /// Merge every occurrence of the key at any depth
        #[arg(long)]
        recursive: bool,
    },
}

pub fn run(overrides: &PathOverrides, command: ConfigCommands) -> Result<(), CliError> {
    let settings = resolve_settings(overrides)?;
    let tree = load_config(&settings)?;

    match command {
        ConfigCommands::Missions => {
            for mission in tree.missions() {
                println!("{}", mission);
            }
            Ok(())
        }
        ConfigCommands::Resolve {
            pointer,
            latest,
            recursive,
        } => {
            let fs = KernelFs::new(settings.data_root.clone(), memo_for(&settings));
            let resolved = match (recursive, latest) {
                (false, false) => tree.resolve(&fs, &pointer)?,
                (false, true) => tree.resolve_latest(&fs, &pointer)?,
                (true, false) => tree.resolve_recursive(&fs, &pointer)?,
                (true, true) => tree.resolve_latest_recursive(&fs, &pointer)?,
            };
            print_json(&resolved)
        }
    }
}
