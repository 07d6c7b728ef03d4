//! Fingerprints of watched filesystem roots.
//!
//! A fingerprint captures existence, kind, size and modification time of
//! each watched path. Cached results are only reused while the fingerprint
//! of every watched root is unchanged.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Kind of filesystem entry at a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Missing,
    File,
    Directory,
    Other,
}

/// Observed state of a single watched root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootFingerprint {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub len: u64,
    pub mtime_secs: u64,
    pub mtime_nanos: u32,
}

impl RootFingerprint {
    /// Observe `path` now. Metadata failures read as a missing entry.
    pub fn observe(path: &Path) -> Self {
        let Ok(meta) = path.metadata() else {
            return Self {
                path: path.to_path_buf(),
                kind: EntryKind::Missing,
                len: 0,
                mtime_secs: 0,
                mtime_nanos: 0,
            };
        };

        let kind = if meta.is_file() {
            EntryKind::File
        } else if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        };

        let since_epoch = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .unwrap_or_default();

        Self {
            path: path.to_path_buf(),
            kind,
            len: meta.len(),
            mtime_secs: since_epoch.as_secs(),
            mtime_nanos: since_epoch.subsec_nanos(),
        }
    }

    pub fn exists(&self) -> bool {
        self.kind != EntryKind::Missing
    }
}

/// Combined fingerprint of all watched roots for one cached call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Library version; cache formats may change between releases.
    pub version: String,
    pub roots: Vec<RootFingerprint>,
}

impl Fingerprint {
    /// Fingerprint `roots` in the order given.
    pub fn of(roots: &[&Path]) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            roots: roots.iter().map(|p| RootFingerprint::observe(p)).collect(),
        }
    }
}
