//! Data-root file listing and kernel pattern matching.
//!
//! All kernel paths handed out by the inventory are stored relative to the
//! data root so a built database stays valid when the tree is relocated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::ConfigError;
use crate::memo::Memo;

/// Filesystem view over the kernel data root.
#[derive(Clone)]
pub struct KernelFs {
    data_root: PathBuf,
    memo: Arc<Memo>,
}

impl KernelFs {
    pub fn new(data_root: impl Into<PathBuf>, memo: Arc<Memo>) -> Self {
        Self {
            data_root: data_root.into(),
            memo,
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn memo(&self) -> &Arc<Memo> {
        &self.memo
    }

    /// List every regular file under `root`, sorted by path.
    ///
    /// Memoized on the fingerprint of `root`.
    pub fn ls(&self, root: &Path, recursive: bool) -> Result<Vec<String>, ConfigError> {
        let root_str = root.to_string_lossy().into_owned();
        self.memo
            .call("ls", &(root_str, recursive), &[root], || list_files(root, recursive))
    }

    /// Match file names under the data root against each pattern.
    ///
    /// Each pattern yields one group of absolute paths; empty groups are
    /// omitted. Hidden files never match.
    pub fn paths_from_regex(&self, patterns: &[String]) -> Result<Vec<Vec<String>>, ConfigError> {
        let root = self.data_root.as_path();
        let args = (root.to_string_lossy().into_owned(), patterns);
        self.memo.call("paths_from_regex", &args, &[root], || {
            let files = self.ls(root, true)?;
            match_patterns(&files, patterns)
        })
    }

    /// Path of `path` relative to the data root, `/`-separated.
    ///
    /// Paths outside the data root are returned unchanged.
    pub fn relative(&self, path: &str) -> String {
        match Path::new(path).strip_prefix(&self.data_root) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string(),
        }
    }

    /// Absolute path for a stored relative path.
    pub fn absolute(&self, relative: &str) -> String {
        self.data_root.join(relative).to_string_lossy().into_owned()
    }
}

fn list_files(root: &Path, recursive: bool) -> Result<Vec<String>, ConfigError> {
    if !root.is_dir() {
        return Err(ConfigError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_string_lossy().into_owned());
        }
    }

    debug!(root = %root.display(), count = files.len(), "Listed data files");
    Ok(files)
}

fn match_patterns(files: &[String], patterns: &[String]) -> Result<Vec<Vec<String>>, ConfigError> {
    let mut groups = Vec::new();
    for pattern in patterns {
        let regex = Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        info!(pattern = %pattern, files = files.len(), "Searching for kernels");

        let group: Vec<String> = files
            .iter()
            .filter(|f| {
                let name = file_name(f);
                !name.starts_with('.') && regex.is_match(name)
            })
            .cloned()
            .collect();

        debug!(pattern = %pattern, found = group.len(), "Pattern matched");
        if !group.is_empty() {
            groups.push(group);
        }
    }
    Ok(groups)
}

fn file_name(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
