//! Database construction from a mission config tree.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use super::{static_set_key, time_set_key, NonTimeKernelSet, TimeIndexedKernelSet};
use crate::config::ConfigTree;
use crate::error::{InventoryError, Result};
use crate::intervals::IntervalCollector;
use crate::json::{flatten_kernels, to_pointer};
use crate::kernel::{KernelType, Quality};
use crate::memo::Memo;
use crate::paths::KernelFs;
use crate::settings::InventorySettings;
use crate::toolkit::{check, KernelToolkit};

/// Fail with [`InventoryError::NotWritable`] unless a file can be created
/// in `dir`. The directory is created when missing.
pub(super) fn probe_writable(dir: &Path) -> Result<()> {
    let not_writable = |source| InventoryError::NotWritable {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(not_writable)?;
    NamedTempFile::new_in(dir).map_err(not_writable)?;
    Ok(())
}

/// Sets produced by a build, keyed by store key. Paths are relative.
#[derive(Debug, Default)]
pub(super) struct BuiltSets {
    pub time_sets: BTreeMap<String, TimeIndexedKernelSet>,
    pub static_sets: BTreeMap<String, NonTimeKernelSet>,
    pub required: Vec<String>,
}

pub(super) struct Builder<'a> {
    config: &'a ConfigTree,
    fs: KernelFs,
    collector: IntervalCollector,
}

impl<'a> Builder<'a> {
    pub fn new(
        config: &'a ConfigTree,
        settings: &InventorySettings,
        toolkit: Arc<dyn KernelToolkit>,
        memo: Arc<Memo>,
    ) -> Self {
        Self {
            config,
            fs: KernelFs::new(settings.data_root.clone(), Arc::clone(&memo)),
            collector: IntervalCollector::new(toolkit, memo),
        }
    }

    /// Build sets for `missions`, or for every mission when empty.
    pub fn build(&self, missions: &[String]) -> Result<BuiltSets> {
        let missions = if missions.is_empty() {
            self.config.missions()
        } else {
            for mission in missions {
                self.config.require_mission(mission)?;
            }
            missions.to_vec()
        };
        info!(missions = missions.len(), data_root = %self.fs.data_root().display(), "Building kernel database");

        let required = self.required_kernels(&missions)?;
        self.furnish(&required);

        let mut built = BuiltSets {
            required: required.iter().map(|p| self.fs.relative(p)).collect(),
            ..Default::default()
        };
        for mission in &missions {
            self.build_mission(mission, &mut built)?;
        }

        info!(
            time_sets = built.time_sets.len(),
            static_sets = built.static_sets.len(),
            required = built.required.len(),
            "Built kernel database"
        );
        Ok(built)
    }

    /// Latest LSKs across the whole tree plus each mission's latest SCLKs,
    /// as absolute paths.
    fn required_kernels(&self, missions: &[String]) -> Result<Vec<String>> {
        let mut required = flatten_kernels(
            &self
                .config
                .resolve_latest_recursive(&self.fs, KernelType::Lsk.as_str())?,
        );
        for mission in missions {
            let sclks = self
                .config
                .subtree(mission)?
                .resolve_latest_recursive(&self.fs, KernelType::Sclk.as_str())?;
            required.extend(flatten_kernels(&sclks));
        }

        let mut seen = HashSet::new();
        required.retain(|p| seen.insert(p.clone()));
        debug!(count = required.len(), "Collected required kernels");
        Ok(required)
    }

    fn furnish(&self, kernels: &[String]) {
        let toolkit = self.collector.toolkit().as_ref();
        for kernel in kernels {
            toolkit.furnish(Path::new(kernel));
            if let Err(e) = check(toolkit) {
                warn!(path = %kernel, error = %e, "Failed to load required kernel");
            }
        }
    }

    fn build_mission(&self, mission: &str, built: &mut BuiltSets) -> Result<()> {
        let tree = self.config.subtree(mission)?;
        debug!(mission, "Building mission sets");

        for kernel_type in KernelType::ALL {
            if kernel_type.is_time_varying() {
                // every version of a time-varying kernel covers its own span
                let resolved = tree.resolve_recursive(&self.fs, kernel_type.as_str())?;
                for quality in Quality::ALL {
                    let pointer = format!("{}{}", to_pointer(kernel_type.as_str()), to_pointer(quality.as_str()));
                    let Some(node) = resolved.pointer(&pointer) else {
                        continue;
                    };
                    let set = self.index_files(node);
                    if set.is_empty() {
                        continue;
                    }
                    info!(mission, kernel_type = %kernel_type, quality = %quality, files = set.len(), "Indexed kernels");
                    built
                        .time_sets
                        .insert(time_set_key(mission, kernel_type, quality), set);
                }
            } else {
                let resolved = tree.resolve_latest_recursive(&self.fs, kernel_type.as_str())?;
                let files: Vec<String> = flatten_kernels(&resolved)
                    .iter()
                    .map(|p| self.fs.relative(p))
                    .collect();
                if files.is_empty() {
                    continue;
                }
                debug!(mission, kernel_type = %kernel_type, files = files.len(), "Collected static kernels");
                built.static_sets.insert(
                    static_set_key(mission, kernel_type),
                    NonTimeKernelSet::new(files),
                );
            }
        }
        Ok(())
    }

    /// Index every kernel under `node` by its coverage interval, skipping
    /// files whose coverage can't be read.
    fn index_files(&self, node: &Value) -> TimeIndexedKernelSet {
        let mut set = TimeIndexedKernelSet::new();
        for path in flatten_kernels(node) {
            match self.collector.interval(Path::new(&path)) {
                Ok(interval) => {
                    let relative = self.fs.relative(&path);
                    match set.insert(relative, interval) {
                        Some(id) => trace!(path = %path, id, start = interval.start, stop = interval.stop, "Indexed kernel"),
                        None => warn!(path = %path, "Skipping kernel with non-finite coverage"),
                    }
                }
                Err(e) => warn!(path = %path, error = %e, "Skipping kernel"),
            }
        }
        set
    }
}
