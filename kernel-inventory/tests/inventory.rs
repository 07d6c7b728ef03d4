//! Build, persist, reload and search against a scripted toolkit.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

use kernel_inventory::config::{ConfigError, ConfigTree};
use kernel_inventory::database::StoreError;
use kernel_inventory::intervals::Interval;
use kernel_inventory::memo::Memo;
use kernel_inventory::toolkit::{FaultFlag, KernelFileKind, KernelToolkit, ToolkitFault};
use kernel_inventory::{
    BuildOptions, Database, InventoryError, InventorySettings, KernelType, Quality, SearchQuery,
};

/// Serves coverage windows keyed by file name.
#[derive(Default)]
struct ScriptedToolkit {
    windows: HashMap<String, Vec<Interval>>,
    corrupt: HashSet<String>,
    furnished: Mutex<Vec<PathBuf>>,
    fault: FaultFlag,
}

impl ScriptedToolkit {
    fn with_window(mut self, file: &str, start: f64, stop: f64) -> Self {
        self.windows
            .entry(file.to_string())
            .or_default()
            .push(Interval::new(start, stop));
        self
    }

    fn with_corrupt(mut self, file: &str) -> Self {
        self.corrupt.insert(file.to_string());
        self
    }

    fn furnished_names(&self) -> Vec<String> {
        self.furnished
            .lock()
            .iter()
            .map(|p| file_name(p))
            .collect()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl KernelToolkit for ScriptedToolkit {
    fn furnish(&self, path: &Path) {
        self.furnished.lock().push(path.to_path_buf());
    }

    fn file_kind(&self, path: &Path) -> Option<KernelFileKind> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bc") => Some(KernelFileKind::Ck),
            Some("bsp") => Some(KernelFileKind::Spk),
            Some(_) => Some(KernelFileKind::Text("FK".to_string())),
            None => None,
        }
    }

    fn objects(&self, _path: &Path, _kind: &KernelFileKind) -> Vec<i32> {
        vec![-85000, -85]
    }

    fn coverage(&self, path: &Path, _kind: &KernelFileKind, object: i32) -> Vec<Interval> {
        let name = file_name(path);
        if self.corrupt.contains(&name) {
            self.fault.raise("SPICE(DAFBADRECORD)", format!("{} has a bad record", name));
            return Vec::new();
        }
        if object != -85 {
            return Vec::new();
        }
        self.windows.get(&name).cloned().unwrap_or_default()
    }

    fn take_fault(&self) -> Option<ToolkitFault> {
        self.fault.take()
    }
}

struct Inventory {
    temp: TempDir,
    settings: InventorySettings,
    config: ConfigTree,
}

fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"kernel").unwrap();
}

fn inventory() -> Inventory {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    for rel in [
        "lsk/naif0011.tls",
        "lsk/naif0012.tls",
        "lro/kernels/ck/lrolc_recon_2013.bc",
        "lro/kernels/ck/lrolc_pred_2012.bc",
        "lro/kernels/ck/lrolc_recon_broken.bc",
        "lro/kernels/spk/lro_smithed_2013.bsp",
        "lro/kernels/fk/lro_frames_v01.tf",
        "lro/kernels/fk/lro_frames_v02.tf",
        "lro/kernels/sclk/lro_clkcor_v01.tsc",
        "lro/kernels/sclk/lro_clkcor_v02.tsc",
        "mro/kernels/ck/mro_sc_recon.bc",
    ] {
        touch(&data, rel);
    }

    let config = ConfigTree::from_value(json!({
        "base": {
            "lsk": {"kernels": ["naif[0-9]{4}\\.tls$"]}
        },
        "lro": {
            "ck": {
                "reconstructed": {"kernels": ["lrolc_recon_.*\\.bc$"]},
                "predicted": {"kernels": ["lrolc_pred_.*\\.bc$"]}
            },
            "spk": {
                "smithed": {"kernels": ["lro_smithed_.*\\.bsp$"]}
            },
            "fk": {"kernels": ["lro_frames_v[0-9]+\\.tf$"]},
            "sclk": {"kernels": ["lro_clkcor_v[0-9]+\\.tsc$"]},
            "lsk": {"deps": ["/base/lsk"]}
        },
        "mro": {
            "ck": {"reconstructed": {"kernels": ["mro_sc_.*\\.bc$"]}}
        }
    }))
    .unwrap();

    let settings = InventorySettings::new(&data).with_cache_dir(temp.path().join("cache"));
    Inventory {
        temp,
        settings,
        config,
    }
}

fn toolkit() -> Arc<ScriptedToolkit> {
    Arc::new(
        ScriptedToolkit::default()
            .with_window("lrolc_recon_2013.bc", 110_000_000.0, 150_000_000.0)
            .with_window("lrolc_pred_2012.bc", 90_000_000.0, 95_000_000.0)
            .with_window("lro_smithed_2013.bsp", 100_000_000.0, 120_000_000.0)
            .with_window("lro_smithed_2013.bsp", 130_000_000.0, 160_000_000.0)
            .with_window("mro_sc_recon.bc", -1_000.0, 5_000.0)
            .with_corrupt("lrolc_recon_broken.bc"),
    )
}

fn build(inv: &Inventory, toolkit: Arc<ScriptedToolkit>, options: BuildOptions) -> Database {
    Database::build(&inv.config, inv.settings.clone(), toolkit, options).unwrap()
}

fn ck_query(start: f64, stop: f64) -> SearchQuery {
    SearchQuery::new(["lro"])
        .with_types([KernelType::Ck])
        .with_range(start, stop)
        .with_ck_qualities([Quality::Reconstructed, Quality::Predicted])
}

fn assert_scenario(db: &Database) {
    let result = db.search(&ck_query(110_000_000.0, 140_000_000.0)).unwrap();
    assert_eq!(result["ck"], json!(["lro/kernels/ck/lrolc_recon_2013.bc"]));
    assert_eq!(result["ck_quality"], json!("reconstructed"));
    assert_eq!(result["lro_ck_quality"], json!("reconstructed"));

    let result = db.search(&ck_query(80_000_000.0, 95_000_000.0)).unwrap();
    assert_eq!(result["ck"], json!(["lro/kernels/ck/lrolc_pred_2012.bc"]));
    assert_eq!(result["ck_quality"], json!("predicted"));
    assert_eq!(result["lro_ck_quality"], json!("predicted"));
}

#[test]
fn test_reconstructed_and_predicted_scenario() {
    let inv = inventory();
    let db = build(&inv, toolkit(), BuildOptions::new());
    assert_scenario(&db);
}

#[test]
fn test_broken_kernel_is_skipped() {
    let inv = inventory();
    let db = build(&inv, toolkit(), BuildOptions::new());

    let set = db
        .time_set("lro", KernelType::Ck, Quality::Reconstructed)
        .unwrap()
        .unwrap();
    assert_eq!(set.file_paths(), &["lro/kernels/ck/lrolc_recon_2013.bc"]);
}

#[test]
fn test_persist_and_reload() {
    let inv = inventory();
    let built = build(&inv, toolkit(), BuildOptions::new().with_persist(true));
    assert!(inv.settings.store_path().is_file());

    let lazy = Database::open(inv.settings.clone());
    assert_scenario(&lazy);

    let eager = Database::load(inv.settings.clone()).unwrap();
    for (mission, kernel_type, quality) in [
        ("lro", KernelType::Ck, Quality::Reconstructed),
        ("lro", KernelType::Ck, Quality::Predicted),
        ("lro", KernelType::Spk, Quality::Smithed),
        ("mro", KernelType::Ck, Quality::Reconstructed),
    ] {
        let original = built.time_set(mission, kernel_type, quality).unwrap().unwrap();
        let reloaded = eager.time_set(mission, kernel_type, quality).unwrap().unwrap();
        assert_eq!(*original, *reloaded, "{mission}/{kernel_type}/{quality}");
        assert!(reloaded.is_consistent());
    }
    assert_eq!(built.loaded_keys(), eager.loaded_keys());
    assert_eq!(built.required_kernels().unwrap(), eager.required_kernels().unwrap());
}

#[test]
fn test_gap_is_hidden_by_collapsed_interval() {
    let inv = inventory();
    let db = build(&inv, toolkit(), BuildOptions::new());
    let result = db
        .search(
            &SearchQuery::new(["lro"])
                .with_types([KernelType::Spk])
                .with_range(121_000_000.0, 125_000_000.0),
        )
        .unwrap();
    assert_eq!(result["spk"], json!(["lro/kernels/spk/lro_smithed_2013.bsp"]));
    assert_eq!(result["spk_quality"], json!("smithed"));
}

#[test]
fn test_static_kernels_keep_latest_version() {
    let inv = inventory();
    let db = build(&inv, toolkit(), BuildOptions::new());

    let result = db
        .search(&SearchQuery::new(["lro"]).with_types([KernelType::Fk, KernelType::Lsk]))
        .unwrap();
    assert_eq!(result["fk"], json!(["lro/kernels/fk/lro_frames_v02.tf"]));
    assert_eq!(result["lsk"], json!(["lsk/naif0012.tls"]));
}

#[test]
fn test_required_kernels_are_furnished() {
    let inv = inventory();
    let toolkit = toolkit();
    let db = build(&inv, toolkit.clone(), BuildOptions::new());

    let furnished = toolkit.furnished_names();
    assert!(furnished.contains(&"naif0012.tls".to_string()));
    assert!(furnished.contains(&"lro_clkcor_v02.tsc".to_string()));
    assert!(!furnished.contains(&"naif0011.tls".to_string()));

    let required = db.required_kernels().unwrap();
    assert_eq!(required.len(), 2);
    let data_root = inv.settings.data_root.to_string_lossy().into_owned();
    assert!(required.iter().all(|p| p.starts_with(&data_root)));
}

#[test]
fn test_full_path_and_negative_times() {
    let inv = inventory();
    let db = build(&inv, toolkit(), BuildOptions::new());
    let result = db
        .search(
            &SearchQuery::new(["MRO"])
                .with_types([KernelType::Ck])
                .with_range(-500.0, -100.0)
                .with_full_path(true),
        )
        .unwrap();
    let expected = inv
        .settings
        .data_root
        .join("mro/kernels/ck/mro_sc_recon.bc")
        .to_string_lossy()
        .into_owned();
    assert_eq!(result["ck"], json!([expected]));
    assert_eq!(result["mro_ck_quality"], json!("reconstructed"));
}

#[test]
fn test_multi_mission_union() {
    let inv = inventory();
    let db = build(&inv, toolkit(), BuildOptions::new());
    let result: Value = db
        .search(
            &SearchQuery::new(["lro", "mro"])
                .with_types([KernelType::Ck])
                .with_range(0.0, 120_000_000.0),
        )
        .unwrap();
    assert_eq!(
        result["ck"],
        json!([
            "lro/kernels/ck/lrolc_recon_2013.bc",
            "mro/kernels/ck/mro_sc_recon.bc"
        ])
    );
    assert_eq!(result["lro_ck_quality"], json!("reconstructed"));
    assert_eq!(result["mro_ck_quality"], json!("reconstructed"));
}

#[test]
fn test_mixed_case_mission_is_searchable() {
    let inv = inventory();
    let config = ConfigTree::from_value(json!({
        "Mro": {"ck": {"reconstructed": {"kernels": ["mro_sc_.*\\.bc$"]}}}
    }))
    .unwrap();
    let db = Database::build(&config, inv.settings.clone(), toolkit(), BuildOptions::new()).unwrap();
    assert_eq!(db.loaded_keys(), vec!["mro/ck/reconstructed/kernels"]);

    for name in ["Mro", "mro"] {
        let result = db
            .search(&SearchQuery::new([name]).with_types([KernelType::Ck]))
            .unwrap();
        assert_eq!(result["ck"], json!(["mro/kernels/ck/mro_sc_recon.bc"]));
        assert_eq!(result["mro_ck_quality"], json!("reconstructed"));
    }
}

#[test]
fn test_mission_subset() {
    let inv = inventory();
    let db = build(&inv, toolkit(), BuildOptions::new().with_missions(["mro"]));
    assert_eq!(db.loaded_keys(), vec!["mro/ck/reconstructed/kernels"]);
}

#[test]
fn test_unknown_mission_fails() {
    let inv = inventory();
    let err = Database::build(
        &inv.config,
        inv.settings.clone(),
        toolkit(),
        BuildOptions::new().with_missions(["lro", "mgs"]),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        InventoryError::Config(ConfigError::UnknownMission { ref name, .. }) if name == "mgs"
    ));
}

#[test]
fn test_unwritable_cache_fails_before_build() {
    let inv = inventory();
    let blocker = inv.temp.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let toolkit = toolkit();

    let err = Database::build(
        &inv.config,
        inv.settings.clone().with_cache_dir(&blocker),
        toolkit.clone(),
        BuildOptions::new(),
    )
    .unwrap_err();
    assert!(matches!(err, InventoryError::NotWritable { .. }));
    assert!(toolkit.furnished_names().is_empty());
}

#[test]
fn test_missing_store_is_a_hard_failure() {
    let inv = inventory();
    let db = Database::open(inv.settings.clone());
    let err = db.search(&ck_query(0.0, 1.0)).unwrap_err();
    assert!(matches!(err, InventoryError::Store(StoreError::NotFound(_))));
}

#[test]
fn test_built_database_tolerates_missing_store() {
    let inv = inventory();
    let db = build(&inv, toolkit(), BuildOptions::new());
    assert!(!inv.settings.store_path().exists());

    let result = db
        .search(&SearchQuery::new(["lro"]).with_types([KernelType::Ck, KernelType::Ik]))
        .unwrap();
    assert!(result.get("ck").is_some());
    assert!(result.get("ik").is_none());
}

#[test]
fn test_shared_memo_skips_repeat_extraction() {
    let inv = inventory();
    let memo = Arc::new(Memo::new(1 << 20));
    build(&inv, toolkit(), BuildOptions::new().with_memo(memo.clone()));
    let first = memo.stats();

    build(&inv, toolkit(), BuildOptions::new().with_memo(memo.clone()));
    let second = memo.stats();
    assert!(second.memory_hits > first.memory_hits);
    // failures aren't cached, so only the broken kernel is read again
    assert_eq!(second.misses, first.misses + 1);
}
