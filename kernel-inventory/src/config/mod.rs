//! Mission configuration tree.
//!
//! A config document maps missions and instruments to kernel types, quality
//! tiers and `kernels` leaves holding regular expressions over file names in
//! the data root. `deps` leaves pull in other parts of the document by JSON
//! pointer and are resolved once, when the tree is constructed.
//!
//! ```text
//! {
//!   "lro": {
//!     "ck":  { "reconstructed": { "kernels": ["lrolc_.*\\.bc$"] } },
//!     "sclk": { "kernels": ["lro_clkcor_.*\\.tsc$"] },
//!     "lsk": { "deps": ["/base/lsk"] }
//!   },
//!   "base": { "lsk": { "kernels": ["naif[0-9]{4}\\.tls$"] } }
//! }
//! ```
//!
//! Resolution replaces every `kernels` leaf with an array of file groups, one
//! group per pattern that matched anything.

mod error;

pub use error::ConfigError;

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::{debug, info, trace};

use crate::json::{
    erase_at_pointer, find_key, kernel_groups, last_token, merge_configs, parent_pointer,
    string_list, to_pointer, tokens,
};
use crate::kernel::collapse_latest;
use crate::paths::KernelFs;

/// Maximum number of `deps` resolution rounds.
pub const MAX_DEPENDENCY_DEPTH: usize = 10;

/// Key marking pattern leaves.
pub const KERNELS_KEY: &str = "kernels";

/// Key marking dependency leaves.
pub const DEPS_KEY: &str = "deps";

/// Dependency-resolved mission configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    doc: Value,
}

impl ConfigTree {
    /// Build a tree from a document, resolving `deps` against the document
    /// itself.
    pub fn from_value(doc: Value) -> Result<Self, ConfigError> {
        let dependencies = doc.clone();
        Self::with_dependencies(doc, &dependencies)
    }

    /// Build a tree from a document whose `deps` point into `dependencies`.
    pub fn with_dependencies(mut doc: Value, dependencies: &Value) -> Result<Self, ConfigError> {
        resolve_dependencies(&mut doc, dependencies)?;
        Ok(Self { doc })
    }

    /// Merge every `*.json` file in `config_dir` into one global tree.
    pub fn load_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let global = read_dir_merged(config_dir)?;
        info!(dir = %config_dir.display(), missions = global.as_object().map_or(0, Map::len), "Loaded mission configs");
        Self::from_value(global)
    }

    /// Load `<config_dir>/<mission>.json` alone.
    ///
    /// Dependencies may still reference any file in the directory.
    pub fn load_mission(config_dir: &Path, mission: &str) -> Result<Self, ConfigError> {
        let path = config_dir.join(format!("{}.json", mission));
        if !path.is_file() {
            return Err(ConfigError::ConfigNotFound(mission.to_string()));
        }
        let doc = read_json(&path)?;
        let dependencies = read_dir_merged(config_dir)?;
        Self::with_dependencies(doc, &dependencies)
    }

    /// The resolved document.
    pub fn global(&self) -> &Value {
        &self.doc
    }

    /// Top-level keys (missions and instruments), sorted.
    pub fn missions(&self) -> Vec<String> {
        self.doc
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Fail with [`ConfigError::UnknownMission`] unless `name` is a top-level key.
    pub fn require_mission(&self, name: &str) -> Result<(), ConfigError> {
        if self.doc.get(name).is_some() {
            return Ok(());
        }
        Err(ConfigError::UnknownMission {
            name: name.to_string(),
            available: self.missions().join(", "),
        })
    }

    /// A new tree rooted at `pointer` (a key or JSON pointer).
    pub fn subtree(&self, pointer: &str) -> Result<ConfigTree, ConfigError> {
        let pointer = to_pointer(pointer);
        self.doc
            .pointer(&pointer)
            .cloned()
            .map(|doc| ConfigTree { doc })
            .ok_or(ConfigError::MissingPointer(pointer))
    }

    /// Whether `key` (a top-level key or a JSON pointer) exists.
    pub fn contains(&self, key: &str) -> bool {
        self.doc.pointer(&to_pointer(key)).is_some()
    }

    /// Pointers to every occurrence of `key`.
    ///
    /// Without `recursive` only top-level entries are considered.
    pub fn find_key(&self, key: &str, recursive: bool) -> Vec<String> {
        find_key(&self.doc, key, recursive)
    }

    /// The leading `position + 1` tokens of `pointer`.
    ///
    /// `parent_pointer("/lro/ck/reconstructed", 0)` is `"/lro"`. Positions past
    /// the end return the whole pointer.
    pub fn parent_pointer(pointer: &str, position: usize) -> String {
        tokens(&to_pointer(pointer))
            .iter()
            .take(position + 1)
            .fold(String::new(), |acc, t| crate::json::push_token(&acc, t))
    }

    /// Expand every `kernels` leaf under `pointer` into file groups.
    pub fn resolve(&self, fs: &KernelFs, pointer: &str) -> Result<Value, ConfigError> {
        let pointer = to_pointer(pointer);
        let mut node = self
            .doc
            .pointer(&pointer)
            .cloned()
            .ok_or_else(|| ConfigError::MissingPointer(pointer.clone()))?;

        if last_token(&pointer).as_deref() == Some(KERNELS_KEY) {
            evaluate_leaf(fs, &mut node, &pointer)?;
        } else {
            evaluate(fs, &mut node)?;
        }
        trace!(pointer = %pointer, "Resolved config subtree");
        Ok(node)
    }

    /// Resolve and merge every occurrence of `key` at any depth.
    ///
    /// The result is `{ key: merged }`, or an empty object when `key` does not
    /// occur.
    pub fn resolve_recursive(&self, fs: &KernelFs, key: &str) -> Result<Value, ConfigError> {
        let mut merged = Value::Object(Map::new());
        for pointer in self.find_key(key, true) {
            let resolved = self.resolve(fs, &pointer)?;
            merge_configs(&mut merged, &json!({ key: resolved }))?;
        }
        debug!(key, "Resolved config key recursively");
        Ok(merged)
    }

    /// [`resolve`](Self::resolve), keeping only the newest revision of each
    /// logical kernel in every group.
    pub fn resolve_latest(&self, fs: &KernelFs, pointer: &str) -> Result<Value, ConfigError> {
        let mut resolved = self.resolve(fs, pointer)?;
        if last_token(&to_pointer(pointer)).as_deref() == Some(KERNELS_KEY) {
            collapse_leaf(&mut resolved);
        } else {
            collapse_all(&mut resolved);
        }
        Ok(resolved)
    }

    /// [`resolve_recursive`](Self::resolve_recursive), keeping only the newest
    /// revision of each logical kernel in every group.
    pub fn resolve_latest_recursive(&self, fs: &KernelFs, key: &str) -> Result<Value, ConfigError> {
        let mut resolved = self.resolve_recursive(fs, key)?;
        collapse_all(&mut resolved);
        Ok(resolved)
    }
}

/// Replace every `deps` leaf with the subtrees it references.
///
/// Fails with [`ConfigError::DependencyDepth`] when references remain after
/// [`MAX_DEPENDENCY_DEPTH`] rounds, which also catches cycles.
pub fn resolve_dependencies(config: &mut Value, dependencies: &Value) -> Result<(), ConfigError> {
    let mut dep_lists = find_key(config, DEPS_KEY, true);
    let mut rounds = 0;

    while !dep_lists.is_empty() {
        if rounds == MAX_DEPENDENCY_DEPTH {
            return Err(ConfigError::DependencyDepth {
                max: MAX_DEPENDENCY_DEPTH,
            });
        }

        for dep_list in &dep_lists {
            let targets = string_list(config, dep_list)?;
            erase_at_pointer(config, dep_list);

            let merge_into = parent_pointer(dep_list);
            for target in targets {
                let source = dependencies
                    .pointer(&target)
                    .ok_or_else(|| ConfigError::MissingPointer(target.clone()))?;
                let parent = config
                    .pointer_mut(merge_into)
                    .ok_or_else(|| ConfigError::MissingPointer(merge_into.to_string()))?;
                merge_configs(parent, source)?;
                trace!(from = %target, into = %merge_into, "Merged config dependency");
            }
        }

        rounds += 1;
        dep_lists = find_key(config, DEPS_KEY, true);
    }

    if rounds > 0 {
        debug!(rounds, "Resolved config dependencies");
    }
    Ok(())
}

fn evaluate(fs: &KernelFs, node: &mut Value) -> Result<(), ConfigError> {
    for pointer in find_key(node, KERNELS_KEY, true) {
        if let Some(leaf) = node.pointer_mut(&pointer) {
            evaluate_leaf(fs, leaf, &pointer)?;
        }
    }
    Ok(())
}

/// Turn a pattern leaf into file groups. Leaves that are already groups are
/// left alone.
fn evaluate_leaf(fs: &KernelFs, leaf: &mut Value, pointer: &str) -> Result<(), ConfigError> {
    let is_patterns = match leaf {
        Value::String(_) => true,
        Value::Array(items) => items.iter().all(Value::is_string),
        _ => false,
    };
    if !is_patterns {
        return Ok(());
    }

    let patterns = string_list(leaf, "").map_err(|_| ConfigError::NotAStringList(pointer.to_string()))?;
    let groups = fs.paths_from_regex(&patterns)?;
    *leaf = json!(groups);
    Ok(())
}

fn collapse_all(node: &mut Value) {
    for pointer in find_key(node, KERNELS_KEY, true) {
        if let Some(leaf) = node.pointer_mut(&pointer) {
            collapse_leaf(leaf);
        }
    }
}

fn collapse_leaf(leaf: &mut Value) {
    let groups: Vec<Vec<String>> = kernel_groups(leaf)
        .iter()
        .map(|group| collapse_latest(group))
        .collect();
    *leaf = json!(groups);
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn read_dir_merged(config_dir: &Path) -> Result<Value, ConfigError> {
    let entries = std::fs::read_dir(config_dir).map_err(|source| ConfigError::Io {
        path: config_dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut global = Value::Object(Map::new());
    for file in files {
        let doc = read_json(&file)?;
        merge_configs(&mut global, &doc)?;
        trace!(file = %file.display(), "Merged config file");
    }
    Ok(global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memo::Memo;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    fn data_fixture() -> (TempDir, KernelFs) {
        let temp = TempDir::new().unwrap();
        for rel in [
            "lro/ck/lrolc_2009181_2009213_v01.bc",
            "lro/ck/lrolc_2009181_2009213_v02.bc",
            "lro/fk/lro_frames_2012255_v01.tf",
            "lro/fk/lro_frames_2012255_v02.tf",
            "lro/ik/lro_lroc_v18.ti",
            "lsk/naif0011.tls",
            "lsk/naif0012.tls",
        ] {
            touch(temp.path(), rel);
        }
        let fs = KernelFs::new(temp.path(), Arc::new(Memo::new(1024 * 1024)));
        (temp, fs)
    }

    fn lro_config() -> Value {
        json!({
            "lro": {
                "ck": {"reconstructed": {"kernels": ["lrolc_.*\\.bc$"]}},
                "fk": {"kernels": "lro_frames_.*\\.tf$"},
                "lsk": {"deps": ["/base/lsk"]}
            },
            "lroc": {
                "ik": {"kernels": ["lro_lroc_v[0-9]+\\.ti$", "no_such_file"]}
            },
            "base": {"lsk": {"kernels": ["naif[0-9]{4}\\.tls$"]}}
        })
    }

    fn chain(depth: usize) -> Value {
        // n0 -> n1 -> ... -> n{depth}
        let mut doc = Map::new();
        for i in 0..depth {
            doc.insert(format!("n{}", i), json!({"deps": [format!("/n{}", i + 1)]}));
        }
        doc.insert(format!("n{}", depth), json!({"leaf": "x"}));
        Value::Object(doc)
    }

    #[test]
    fn test_dependencies_are_merged() {
        let tree = ConfigTree::from_value(lro_config()).unwrap();
        assert_eq!(
            tree.global()["lro"]["lsk"],
            json!({"kernels": ["naif[0-9]{4}\\.tls$"]})
        );
        assert!(tree.find_key("deps", true).is_empty());
    }

    #[test]
    fn test_dependency_depth_limit() {
        assert!(ConfigTree::from_value(chain(9)).is_ok());
        let tree = ConfigTree::from_value(chain(10)).unwrap();
        assert_eq!(tree.global()["n0"]["leaf"], json!("x"));

        let err = ConfigTree::from_value(chain(11)).unwrap_err();
        assert!(matches!(err, ConfigError::DependencyDepth { max: 10 }));
    }

    #[test]
    fn test_dependency_cycle_fails() {
        let doc = json!({"a": {"deps": ["/b"]}, "b": {"deps": ["/a"]}});
        let err = ConfigTree::from_value(doc).unwrap_err();
        assert!(matches!(err, ConfigError::DependencyDepth { .. }));
    }

    #[test]
    fn test_missing_dependency_target() {
        let doc = json!({"a": {"deps": ["/nope"]}});
        let err = ConfigTree::from_value(doc).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPointer(p) if p == "/nope"));
    }

    #[test]
    fn test_missions_and_contains() {
        let tree = ConfigTree::from_value(lro_config()).unwrap();
        assert_eq!(tree.missions(), vec!["base", "lro", "lroc"]);
        assert!(tree.contains("lro"));
        assert!(tree.contains("/lro/ck/reconstructed"));
        assert!(!tree.contains("mro"));
        assert!(tree.require_mission("lro").is_ok());

        let err = tree.require_mission("mro").unwrap_err();
        assert!(err.to_string().contains("lro, lroc"));
    }

    #[test]
    fn test_parent_pointer_positions() {
        assert_eq!(ConfigTree::parent_pointer("/lro/ck/reconstructed", 0), "/lro");
        assert_eq!(ConfigTree::parent_pointer("/lro/ck/reconstructed", 1), "/lro/ck");
        assert_eq!(
            ConfigTree::parent_pointer("/lro/ck/reconstructed", 9),
            "/lro/ck/reconstructed"
        );
    }

    #[test]
    fn test_resolve_expands_patterns() {
        let (_temp, fs) = data_fixture();
        let tree = ConfigTree::from_value(lro_config()).unwrap();

        let lroc = tree.resolve(&fs, "lroc").unwrap();
        let groups = kernel_groups(&lroc["ik"]["kernels"]);
        assert_eq!(groups.len(), 1, "empty pattern groups are dropped");
        assert!(groups[0][0].ends_with("lro_lroc_v18.ti"));

        let ck = tree.resolve(&fs, "/lro/ck/reconstructed/kernels").unwrap();
        assert_eq!(kernel_groups(&ck)[0].len(), 2);
    }

    #[test]
    fn test_resolve_missing_pointer() {
        let (_temp, fs) = data_fixture();
        let tree = ConfigTree::from_value(lro_config()).unwrap();
        assert!(matches!(
            tree.resolve(&fs, "/mro"),
            Err(ConfigError::MissingPointer(_))
        ));
    }

    #[test]
    fn test_resolve_latest_keeps_newest() {
        let (_temp, fs) = data_fixture();
        let tree = ConfigTree::from_value(lro_config()).unwrap();

        let lro = tree.resolve_latest(&fs, "lro").unwrap();
        let fk = kernel_groups(&lro["fk"]["kernels"]);
        assert_eq!(fk.len(), 1);
        assert_eq!(fk[0].len(), 1);
        assert!(fk[0][0].ends_with("lro_frames_2012255_v02.tf"));

        let lsk = kernel_groups(&lro["lsk"]["kernels"]);
        assert!(lsk[0][0].ends_with("naif0012.tls"));
    }

    #[test]
    fn test_resolve_recursive_merges_occurrences() {
        let (_temp, fs) = data_fixture();
        let tree = ConfigTree::from_value(lro_config()).unwrap();

        let lsk = tree.resolve_latest_recursive(&fs, "lsk").unwrap();
        // "/base/lsk" and the dependency copy under "/lro/lsk" both resolve.
        let groups = kernel_groups(&lsk["lsk"]["kernels"]);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.len() == 1 && g[0].ends_with("naif0012.tls")));

        let none = tree.resolve_recursive(&fs, "spk").unwrap();
        assert_eq!(none, json!({}));
    }

    #[test]
    fn test_load_dir_and_mission() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("lro.json"),
            r#"{"lro": {"lsk": {"deps": ["/base/lsk"]}}}"#,
        )
        .unwrap();
        std::fs::write(
            temp.path().join("base.json"),
            r#"{"base": {"lsk": {"kernels": ["naif.*"]}}}"#,
        )
        .unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let all = ConfigTree::load_dir(temp.path()).unwrap();
        assert_eq!(all.missions(), vec!["base", "lro"]);

        let lro = ConfigTree::load_mission(temp.path(), "lro").unwrap();
        assert_eq!(lro.missions(), vec!["lro"]);
        assert_eq!(lro.global()["lro"]["lsk"]["kernels"], json!(["naif.*"]));

        assert!(matches!(
            ConfigTree::load_mission(temp.path(), "mro"),
            Err(ConfigError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_load_dir_parse_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("bad.json"), "{not json").unwrap();
        assert!(matches!(
            ConfigTree::load_dir(temp.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_subtree() {
        let tree = ConfigTree::from_value(lro_config()).unwrap();
        let lro = tree.subtree("lro").unwrap();
        assert!(lro.contains("ck"));
        assert!(tree.subtree("/nope").is_err());
    }
}
