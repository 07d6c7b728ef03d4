//! Interval index over kernel files.
//!
//! Each file gets a stable id (its position in `file_paths`). Two ordered
//! maps, keyed by start and by stop time, answer overlap queries with one
//! range scan each. Keys are unique: a colliding start is nudged down and a
//! colliding stop nudged up by [`COLLISION_EPSILON`] until free.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intervals::Interval;

/// Step applied to a colliding index key, in seconds.
pub const COLLISION_EPSILON: f64 = 1e-7;

/// Totally ordered `f64` index key.
#[derive(Debug, Clone, Copy)]
pub struct TimeKey(pub f64);

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Persisted column layout of a [`TimeIndexedKernelSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTimeSet {
    pub file_paths: Vec<String>,
    pub start_times: Vec<f64>,
    pub start_ids: Vec<u64>,
    pub stop_times: Vec<f64>,
    pub stop_ids: Vec<u64>,
}

/// A persisted set whose columns do not describe a valid index.
#[derive(Debug, Error, PartialEq)]
#[error("inconsistent time index: {0}")]
pub struct InconsistentIndex(pub String);

/// Kernel files of one (mission, type, quality), indexed by validity interval.
///
/// Owned by the database and shared read-only; deliberately not `Clone`.
#[derive(Debug, Default, PartialEq)]
pub struct TimeIndexedKernelSet {
    file_paths: Vec<String>,
    start_index: BTreeMap<TimeKey, usize>,
    stop_index: BTreeMap<TimeKey, usize>,
}

impl TimeIndexedKernelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file and index its interval. Returns the new id, or `None`
    /// when either bound is not finite.
    pub fn insert(&mut self, path: impl Into<String>, interval: Interval) -> Option<usize> {
        if !interval.start.is_finite() || !interval.stop.is_finite() {
            return None;
        }

        let id = self.file_paths.len();
        let start = free_key(&self.start_index, interval.start, false);
        let stop = free_key(&self.stop_index, interval.stop, true);

        self.file_paths.push(path.into());
        self.start_index.insert(TimeKey(start), id);
        self.stop_index.insert(TimeKey(stop), id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.file_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_paths.is_empty()
    }

    pub fn file_paths(&self) -> &[String] {
        &self.file_paths
    }

    pub fn path(&self, id: usize) -> Option<&str> {
        self.file_paths.get(id).map(String::as_str)
    }

    /// Ids of files whose interval overlaps `[start, stop]`, ascending.
    pub fn overlapping(&self, start: f64, stop: f64) -> Vec<usize> {
        let mut starts_before = vec![false; self.file_paths.len()];
        for (_, &id) in self.start_index.range(..=TimeKey(stop)) {
            starts_before[id] = true;
        }

        let mut ids: Vec<usize> = self
            .stop_index
            .range(TimeKey(start)..)
            .map(|(_, &id)| id)
            .filter(|&id| starts_before[id])
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Paths of files overlapping `[start, stop]`, in id order.
    pub fn overlapping_paths(&self, start: f64, stop: f64) -> Vec<&str> {
        self.overlapping(start, stop)
            .into_iter()
            .filter_map(|id| self.path(id))
            .collect()
    }

    /// Both indices have one entry per file and each id appears exactly once.
    pub fn is_consistent(&self) -> bool {
        let n = self.file_paths.len();
        n == self.start_index.len()
            && n == self.stop_index.len()
            && covers_each_id_once(self.start_index.values().copied(), n)
            && covers_each_id_once(self.stop_index.values().copied(), n)
    }

    pub fn to_persisted(&self) -> PersistedTimeSet {
        let (start_times, start_ids) = columns(&self.start_index);
        let (stop_times, stop_ids) = columns(&self.stop_index);
        PersistedTimeSet {
            file_paths: self.file_paths.clone(),
            start_times,
            start_ids,
            stop_times,
            stop_ids,
        }
    }

    /// Rebuild a set from its persisted columns. Keys are restored exactly,
    /// without re-applying collision nudges.
    pub fn from_persisted(persisted: PersistedTimeSet) -> Result<Self, InconsistentIndex> {
        let n = persisted.file_paths.len();
        let start_index = index_from(&persisted.start_times, &persisted.start_ids, n, "start")?;
        let stop_index = index_from(&persisted.stop_times, &persisted.stop_ids, n, "stop")?;

        let set = Self {
            file_paths: persisted.file_paths,
            start_index,
            stop_index,
        };
        if !set.is_consistent() {
            return Err(InconsistentIndex("ids do not cover every file".to_string()));
        }
        Ok(set)
    }
}

fn free_key(index: &BTreeMap<TimeKey, usize>, mut key: f64, upward: bool) -> f64 {
    while index.contains_key(&TimeKey(key)) {
        let stepped = if upward {
            key + COLLISION_EPSILON
        } else {
            key - COLLISION_EPSILON
        };
        // Past ~2^29 s the epsilon is below float resolution.
        key = if stepped == key {
            next_representable(key, upward)
        } else {
            stepped
        };
    }
    key
}

fn next_representable(x: f64, upward: bool) -> f64 {
    if x == 0.0 {
        let tiny = f64::from_bits(1);
        return if upward { tiny } else { -tiny };
    }
    let bits = x.to_bits();
    if (x > 0.0) == upward {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

fn covers_each_id_once(ids: impl Iterator<Item = usize>, n: usize) -> bool {
    let mut seen = vec![false; n];
    for id in ids {
        if id >= n || seen[id] {
            return false;
        }
        seen[id] = true;
    }
    seen.into_iter().all(|s| s)
}

fn columns(index: &BTreeMap<TimeKey, usize>) -> (Vec<f64>, Vec<u64>) {
    index.iter().map(|(k, &id)| (k.0, id as u64)).unzip()
}

fn index_from(
    times: &[f64],
    ids: &[u64],
    n: usize,
    which: &str,
) -> Result<BTreeMap<TimeKey, usize>, InconsistentIndex> {
    if times.len() != n || ids.len() != n {
        return Err(InconsistentIndex(format!(
            "{} index has {} times and {} ids for {} files",
            which,
            times.len(),
            ids.len(),
            n
        )));
    }

    let mut index = BTreeMap::new();
    for (&time, &id) in times.iter().zip(ids) {
        let id = usize::try_from(id)
            .ok()
            .filter(|&id| id < n)
            .ok_or_else(|| InconsistentIndex(format!("{} id {} out of range", which, id)))?;
        if index.insert(TimeKey(time), id).is_some() {
            return Err(InconsistentIndex(format!("duplicate {} time {}", which, time)));
        }
    }
    Ok(index)
}
