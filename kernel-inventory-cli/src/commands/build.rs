//! `kinv build`

use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use kernel_inventory::toolkit::NativeToolkit;
use kernel_inventory::{BuildOptions, Database};
use tracing::info;

use super::common::{load_config, memo_for, resolve_settings, PathOverrides};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Only build these missions (repeatable); all missions by default
    #[arg(short, long = "mission")]
    missions: Vec<String>,

    /// Build in memory without writing the database
    #[arg(long)]
    dry_run: bool,
}

pub fn run(overrides: &PathOverrides, args: BuildArgs) -> Result<(), CliError> {
    let settings = resolve_settings(overrides)?;
    let config = load_config(&settings)?;
    let memo = memo_for(&settings);

    let started = Instant::now();
    let options = BuildOptions::new()
        .with_missions(args.missions)
        .with_persist(!args.dry_run)
        .with_memo(Arc::clone(&memo));
    let db = Database::build(&config, settings, Arc::new(NativeToolkit::new()), options)?;

    let stats = memo.stats();
    info!(
        memory_hits = stats.memory_hits,
        disk_hits = stats.disk_hits,
        misses = stats.misses,
        "Memo usage"
    );

    let keys = db.loaded_keys();
    println!(
        "Indexed {} kernel sets in {:.1}s",
        keys.len(),
        started.elapsed().as_secs_f64()
    );
    for key in &keys {
        println!("  {}", key);
    }
    if args.dry_run {
        println!("Dry run: database not written");
    } else {
        println!("Database: {}", db.store_path().display());
    }
    Ok(())
}
