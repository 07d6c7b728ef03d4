//! `kinv coverage`

use std::path::Path;
use std::sync::Arc;

use kernel_inventory::intervals::IntervalCollector;
use kernel_inventory::memo::Memo;
use kernel_inventory::toolkit::{check, KernelToolkit, NativeToolkit};
use kernel_inventory::Database;
use tracing::{debug, warn};

use super::common::{resolve_settings, PathOverrides};
use crate::error::CliError;

const SECONDS_PER_DAY: f64 = 86_400.0;

pub fn run(overrides: &PathOverrides, file: &Path) -> Result<(), CliError> {
    let toolkit = Arc::new(NativeToolkit::new());
    furnish_required(overrides, toolkit.as_ref());

    let collector = IntervalCollector::new(toolkit.clone(), Arc::new(Memo::default()));
    let windows = collector.all_intervals(file)?;
    let overall = collector.interval(file)?;

    let kind = toolkit.file_kind(file);
    check(toolkit.as_ref())?;
    match kind {
        Some(kind) => println!("{} ({})", file.display(), kind),
        None => println!("{}", file.display()),
    }
    for window in &windows {
        println!(
            "  {:>20.6} .. {:>20.6}  ({:.2} days)",
            window.start,
            window.stop,
            (window.stop - window.start) / SECONDS_PER_DAY
        );
    }
    println!(
        "Overall: {:.6} .. {:.6} in {} window(s)",
        overall.start,
        overall.stop,
        windows.len()
    );
    Ok(())
}

/// Clock and leap-second kernels recorded by the last build; CK ticks can't
/// be converted without them.
fn furnish_required(overrides: &PathOverrides, toolkit: &dyn KernelToolkit) {
    let kernels = match resolve_settings(overrides)
        .map(Database::open)
        .and_then(|db| db.required_kernels().map_err(CliError::from))
    {
        Ok(kernels) => kernels,
        Err(e) => {
            warn!(error = %e, "No required kernels loaded; CK coverage may fail");
            return;
        }
    };

    for kernel in &kernels {
        toolkit.furnish(Path::new(kernel));
        match check(toolkit) {
            Ok(()) => debug!(path = %kernel, "Loaded required kernel"),
            Err(e) => warn!(path = %kernel, error = %e, "Failed to load required kernel"),
        }
    }
}
