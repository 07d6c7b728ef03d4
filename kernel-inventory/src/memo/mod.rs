//! Fingerprint-keyed memoization of expensive filesystem operations.
//!
//! [`Memo::call`] wraps a fallible computation with a cache keyed on the
//! operation name, its serialized arguments and the [`Fingerprint`] of the
//! paths it depends on. Entries live in an in-memory moka cache and, when a
//! disk directory is configured, in bincode files that survive the process.
//!
//! Failures are never cached.
//!
//! # Example
//!
//! ```
//! use kernel_inventory::memo::Memo;
//! use tempfile::TempDir;
//!
//! let temp = TempDir::new().unwrap();
//! let memo = Memo::new(1024 * 1024);
//!
//! let first: Result<u32, std::io::Error> =
//!     memo.call("answer", &(), &[temp.path()], || Ok(42));
//! let second: Result<u32, std::io::Error> =
//!     memo.call("answer", &(), &[temp.path()], || Ok(0));
//! assert_eq!(first.unwrap(), 42);
//! assert_eq!(second.unwrap(), 42);
//! ```

mod fingerprint;

pub use fingerprint::{EntryKind, Fingerprint, RootFingerprint};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache as MokaCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

/// Default in-memory capacity in bytes.
pub const DEFAULT_MEMO_CAPACITY: u64 = 256 * 1024 * 1024;

/// Hit/miss counters for a [`Memo`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// Memoization cache for filesystem-derived results.
pub struct Memo {
    entries: MokaCache<String, Arc<Vec<u8>>>,
    disk_dir: Option<PathBuf>,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

impl Memo {
    /// Create an in-memory memo bounded to `max_size_bytes` of encoded results.
    pub fn new(max_size_bytes: u64) -> Self {
        let entries = MokaCache::builder()
            .weigher(|_key: &String, value: &Arc<Vec<u8>>| -> u32 {
                value.len().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .build();

        Self {
            entries,
            disk_dir: None,
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Also persist entries under `dir` so they outlive the process.
    pub fn with_disk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = Some(dir.into());
        self
    }

    /// Directory of the disk tier, if enabled.
    pub fn disk_dir(&self) -> Option<&Path> {
        self.disk_dir.as_deref()
    }

    /// Return the cached result of `name(args)` or compute it with `f`.
    ///
    /// The result is reused only while every path in `watched` has the same
    /// fingerprint as when it was stored. Errors from `f` are returned as-is
    /// and leave the cache untouched.
    pub fn call<A, R, E, F>(&self, name: &str, args: &A, watched: &[&Path], f: F) -> Result<R, E>
    where
        A: Serialize + ?Sized,
        R: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<R, E>,
    {
        let Some(key) = cache_key(name, args, watched) else {
            warn!(name, "Memo arguments not serializable, bypassing cache");
            return f();
        };

        if let Some(bytes) = self.entries.get(&key) {
            if let Ok(value) = bincode::deserialize::<R>(&bytes) {
                self.memory_hits.fetch_add(1, Ordering::Relaxed);
                trace!(name, key = %key, "Memo hit");
                return Ok(value);
            }
            self.entries.invalidate(&key);
        }

        if let Some(bytes) = self.read_disk(&key) {
            if let Ok(value) = bincode::deserialize::<R>(&bytes) {
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!(name, key = %key, "Memo disk hit");
                self.entries.insert(key, Arc::new(bytes));
                return Ok(value);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(name, key = %key, "Memo miss");
        let value = f()?;

        match bincode::serialize(&value) {
            Ok(bytes) => {
                self.write_disk(&key, &bytes);
                self.entries.insert(key, Arc::new(bytes));
            }
            Err(e) => warn!(name, error = %e, "Failed to encode memo result"),
        }

        Ok(value)
    }

    /// Drop every in-memory entry. Disk entries are left in place.
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    pub fn stats(&self) -> MemoStats {
        self.entries.run_pending_tasks();
        MemoStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }

    fn disk_path(&self, key: &str) -> Option<PathBuf> {
        self.disk_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.bin", key)))
    }

    fn read_disk(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.disk_path(key)?;
        std::fs::read(path).ok()
    }

    fn write_disk(&self, key: &str, bytes: &[u8]) {
        let (Some(dir), Some(path)) = (self.disk_dir.as_ref(), self.disk_path(key)) else {
            return;
        };

        // Write to temp file first, then rename for atomicity
        let result = std::fs::create_dir_all(dir)
            .and_then(|_| tempfile::NamedTempFile::new_in(dir))
            .and_then(|mut tmp| {
                tmp.write_all(bytes)?;
                tmp.persist(&path).map_err(|e| e.error)?;
                Ok(())
            });

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write memo entry to disk");
        }
    }
}

impl Default for Memo {
    fn default() -> Self {
        Self::new(DEFAULT_MEMO_CAPACITY)
    }
}

/// SHA-256 over the operation name, encoded arguments and watched fingerprint.
fn cache_key<A: Serialize + ?Sized>(name: &str, args: &A, watched: &[&Path]) -> Option<String> {
    let args = bincode::serialize(args).ok()?;
    let fingerprint = bincode::serialize(&Fingerprint::of(watched)).ok()?;

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(&args);
    hasher.update([0u8]);
    hasher.update(&fingerprint);
    Some(format!("{:x}", hasher.finalize()))
}
