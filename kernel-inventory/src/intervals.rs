//! Validity intervals of time-varying kernels.
//!
//! The [`IntervalCollector`] asks the toolkit for every negative object
//! (spacecraft and instruments) in a kernel and gathers their coverage
//! windows. Results are memoized on the fingerprint of the kernel file.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::memo::Memo;
use crate::toolkit::{check, KernelToolkit, ToolkitError};

/// A closed time interval in ephemeris seconds past J2000.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub stop: f64,
}

impl Interval {
    pub fn new(start: f64, stop: f64) -> Self {
        Self { start, stop }
    }

    /// Whether this interval and `[start, stop]` share at least one instant.
    pub fn overlaps(&self, start: f64, stop: f64) -> bool {
        self.start <= stop && self.stop >= start
    }
}

/// Sort windows and merge the ones that overlap or touch.
pub fn union_windows(mut windows: Vec<Interval>) -> Vec<Interval> {
    windows.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut merged: Vec<Interval> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(last) if window.start <= last.stop => last.stop = last.stop.max(window.stop),
            _ => merged.push(window),
        }
    }
    merged
}

/// Reads kernel coverage through a toolkit.
#[derive(Clone)]
pub struct IntervalCollector {
    toolkit: Arc<dyn KernelToolkit>,
    memo: Arc<Memo>,
}

impl IntervalCollector {
    pub fn new(toolkit: Arc<dyn KernelToolkit>, memo: Arc<Memo>) -> Self {
        Self { toolkit, memo }
    }

    pub fn toolkit(&self) -> &Arc<dyn KernelToolkit> {
        &self.toolkit
    }

    /// Overall `[min start, max stop]` of the kernel at `path`.
    ///
    /// Gaps between coverage windows are hidden; use
    /// [`all_intervals`](Self::all_intervals) to see them.
    pub fn interval(&self, path: &Path) -> Result<Interval, ToolkitError> {
        let key = path.to_string_lossy().into_owned();
        self.memo.call("interval", &key, &[path], || {
            let windows = self.collect(path)?;
            let start = windows.iter().map(|w| w.start).fold(f64::INFINITY, f64::min);
            let stop = windows.iter().map(|w| w.stop).fold(f64::NEG_INFINITY, f64::max);
            trace!(path = %path.display(), start, stop, "Kernel interval");
            Ok(Interval::new(start, stop))
        })
    }

    /// Every coverage window of every negative object in the kernel, merged.
    pub fn all_intervals(&self, path: &Path) -> Result<Vec<Interval>, ToolkitError> {
        let key = path.to_string_lossy().into_owned();
        self.memo
            .call("all_intervals", &key, &[path], || self.collect(path))
    }

    fn collect(&self, path: &Path) -> Result<Vec<Interval>, ToolkitError> {
        let toolkit = self.toolkit.as_ref();

        let kind = toolkit.file_kind(path);
        check(toolkit)?;
        let Some(kind) = kind else {
            return Err(ToolkitError::UnsupportedKernel {
                path: path.to_path_buf(),
                kind: "unknown".to_string(),
            });
        };
        if !kind.has_coverage() {
            return Err(ToolkitError::UnsupportedKernel {
                path: path.to_path_buf(),
                kind: kind.to_string(),
            });
        }

        let objects = toolkit.objects(path, &kind);
        check(toolkit)?;

        let mut windows = Vec::new();
        for object in objects.into_iter().filter(|id| *id < 0) {
            let coverage = toolkit.coverage(path, &kind, object);
            check(toolkit)?;
            windows.extend(coverage);
        }

        if windows.is_empty() {
            return Err(ToolkitError::NoCoverage(path.to_path_buf()));
        }
        debug!(path = %path.display(), kind = %kind, windows = windows.len(), "Collected kernel coverage");
        Ok(union_windows(windows))
    }
}
