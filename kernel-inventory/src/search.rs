//! Inventory queries.
//!
//! A search returns a JSON document mapping kernel type names to file lists.
//! Time-varying types also report which quality tier answered:
//!
//! ```json
//! {
//!   "ck": ["lro/ck/lrolc_2010.bc"],
//!   "ck_quality": "reconstructed",
//!   "lro_ck_quality": "reconstructed",
//!   "fk": ["lro/fk/lro_frames_v02.tf"]
//! }
//! ```

use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use crate::database::Database;
use crate::error::{InventoryError, Result};
use crate::json::merge_results;
use crate::kernel::{KernelType, Quality};

/// Parameters of [`Database::search`].
///
/// Quality lists are in preference order, most preferred first; an empty
/// list means [`Quality::preferred_order`]. A limit of zero is unlimited.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub names: Vec<String>,
    pub types: Vec<KernelType>,
    pub start: f64,
    pub stop: f64,
    pub ck_qualities: Vec<Quality>,
    pub spk_qualities: Vec<Quality>,
    pub full_path: bool,
    pub limit_ck: usize,
    pub limit_spk: usize,
    /// Replace fields wholesale when merging per-name results instead of
    /// unioning arrays.
    pub overwrite: bool,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            types: KernelType::ALL.to_vec(),
            start: f64::MIN,
            stop: f64::MAX,
            ck_qualities: Vec::new(),
            spk_qualities: Vec::new(),
            full_path: false,
            limit_ck: 0,
            limit_spk: 0,
            overwrite: false,
        }
    }
}

impl SearchQuery {
    /// Query every kernel type of `names` over all time.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = KernelType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    pub fn with_range(mut self, start: f64, stop: f64) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn with_ck_qualities(mut self, qualities: impl IntoIterator<Item = Quality>) -> Self {
        self.ck_qualities = qualities.into_iter().collect();
        self
    }

    pub fn with_spk_qualities(mut self, qualities: impl IntoIterator<Item = Quality>) -> Self {
        self.spk_qualities = qualities.into_iter().collect();
        self
    }

    pub fn with_full_path(mut self, full_path: bool) -> Self {
        self.full_path = full_path;
        self
    }

    pub fn with_limit_ck(mut self, limit: usize) -> Self {
        self.limit_ck = limit;
        self
    }

    pub fn with_limit_spk(mut self, limit: usize) -> Self {
        self.limit_spk = limit;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Quality preferences and limit for a time-varying type.
    fn tiers(&self, kernel_type: KernelType) -> (Vec<Quality>, usize) {
        let (prefs, limit) = match kernel_type {
            KernelType::Ck => (&self.ck_qualities, self.limit_ck),
            _ => (&self.spk_qualities, self.limit_spk),
        };
        if prefs.is_empty() {
            (Quality::preferred_order(), limit)
        } else {
            (prefs.clone(), limit)
        }
    }
}

impl Database {
    /// Find the kernels matching `query`.
    ///
    /// Fails with [`InventoryError::InvalidRange`] when the start time is
    /// after the stop time, before anything is looked up.
    pub fn search(&self, query: &SearchQuery) -> Result<Value> {
        if query.start > query.stop {
            return Err(InventoryError::InvalidRange {
                start: query.start,
                stop: query.stop,
            });
        }

        let mut result = Value::Object(Map::new());
        for name in &query.names {
            let partial = self.search_name(&name.to_lowercase(), query)?;
            merge_results(&mut result, &partial, query.overwrite);
        }
        Ok(result)
    }

    fn search_name(&self, name: &str, query: &SearchQuery) -> Result<Value> {
        let mut doc = Map::new();

        for &kernel_type in &query.types {
            if !kernel_type.is_time_varying() {
                let Some(set) = self.static_set(name, kernel_type)? else {
                    trace!(name, kernel_type = %kernel_type, "No static kernels");
                    continue;
                };
                if !set.is_empty() {
                    doc.insert(
                        kernel_type.to_string(),
                        json!(self.present(set.file_paths().iter().map(String::as_str), query.full_path)),
                    );
                }
                continue;
            }

            let (tiers, limit) = query.tiers(kernel_type);
            for quality in tiers {
                let Some(set) = self.time_set(name, kernel_type, quality)? else {
                    continue;
                };
                let mut ids = set.overlapping(query.start, query.stop);
                if ids.is_empty() {
                    trace!(name, kernel_type = %kernel_type, quality = %quality, "No overlapping kernels, falling back");
                    continue;
                }
                if limit > 0 && ids.len() > limit {
                    let excess = ids.len() - limit;
                    ids.drain(..excess);
                }

                let paths = self.present(ids.iter().filter_map(|&id| set.path(id)), query.full_path);
                debug!(name, kernel_type = %kernel_type, quality = %quality, files = paths.len(), "Matched kernels");
                doc.insert(kernel_type.to_string(), json!(paths));
                doc.insert(format!("{}_quality", kernel_type), json!(quality.as_str()));
                doc.insert(
                    format!("{}_{}_quality", name, kernel_type),
                    json!(quality.as_str()),
                );
                break;
            }
        }
        Ok(Value::Object(doc))
    }

    fn present<'a>(&self, paths: impl Iterator<Item = &'a str>, full_path: bool) -> Vec<String> {
        if full_path {
            paths.map(|p| self.absolute(p)).collect()
        } else {
            paths.map(str::to_string).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{static_set_key, time_set_key, NonTimeKernelSet, StoreWriter, TimeIndexedKernelSet};
    use crate::intervals::Interval;
    use crate::settings::InventorySettings;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        db: Database,
    }

    fn put_set(writer: &mut StoreWriter, key: String, files: &[(&str, f64, f64)]) {
        let mut set = TimeIndexedKernelSet::new();
        for &(path, start, stop) in files {
            set.insert(path, Interval::new(start, stop));
        }
        writer.put(key, &set.to_persisted()).unwrap();
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let settings = InventorySettings::new(temp.path().join("data"))
            .with_cache_dir(temp.path().join("cache"));

        let mut writer = StoreWriter::new();
        put_set(
            &mut writer,
            time_set_key("lro", KernelType::Ck, Quality::Reconstructed),
            &[("ck/recon_a.bc", 10.0, 20.0), ("ck/recon_b.bc", 100.0, 200.0)],
        );
        put_set(
            &mut writer,
            time_set_key("lro", KernelType::Ck, Quality::Smithed),
            &[("ck/smithed.bc", 40.0, 60.0)],
        );
        put_set(
            &mut writer,
            time_set_key("lro", KernelType::Spk, Quality::Predicted),
            &[
                ("spk/p1.bsp", 0.0, 50.0),
                ("spk/p2.bsp", 10.0, 60.0),
                ("spk/p3.bsp", 20.0, 70.0),
            ],
        );
        put_set(
            &mut writer,
            time_set_key("mro", KernelType::Ck, Quality::Reconstructed),
            &[("ck/recon_a.bc", 10.0, 20.0), ("ck/mro.bc", 15.0, 18.0)],
        );
        writer
            .put(
                static_set_key("lro", KernelType::Fk),
                &NonTimeKernelSet::new(vec!["fk/lro_frames_v02.tf".to_string()]),
            )
            .unwrap();
        std::fs::create_dir_all(&settings.cache_dir).unwrap();
        writer.write_to(&settings.store_path()).unwrap();

        Fixture {
            db: Database::open(settings),
            _temp: temp,
        }
    }

    fn ck(db: &Database, start: f64, stop: f64) -> Value {
        db.search(
            &SearchQuery::new(["lro"])
                .with_types([KernelType::Ck])
                .with_range(start, stop)
                .with_ck_qualities([Quality::Reconstructed]),
        )
        .unwrap()
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let f = fixture();
        assert_eq!(ck(&f.db, 15.0, 25.0)["ck"], json!(["ck/recon_a.bc"]));
        assert_eq!(ck(&f.db, 0.0, 10.0)["ck"], json!(["ck/recon_a.bc"]));
        assert!(ck(&f.db, 21.0, 30.0).get("ck").is_none());
    }

    #[test]
    fn test_invalid_range() {
        let f = fixture();
        let err = f
            .db
            .search(&SearchQuery::new(["lro"]).with_range(5.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidRange { .. }));

        let err = f
            .db
            .search(&SearchQuery::new(Vec::<String>::new()).with_range(5.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidRange { .. }), "fails even without data");
    }

    #[test]
    fn test_fallback_on_empty_result() {
        let f = fixture();
        let result = f
            .db
            .search(
                &SearchQuery::new(["lro"])
                    .with_types([KernelType::Ck])
                    .with_range(45.0, 50.0)
                    .with_ck_qualities([Quality::Reconstructed, Quality::Smithed, Quality::Predicted]),
            )
            .unwrap();
        assert_eq!(result["ck"], json!(["ck/smithed.bc"]));
        assert_eq!(result["ck_quality"], json!("smithed"));
        assert_eq!(result["lro_ck_quality"], json!("smithed"));
    }

    #[test]
    fn test_default_preference_order() {
        let f = fixture();
        let result = f
            .db
            .search(
                &SearchQuery::new(["LRO"])
                    .with_types([KernelType::Ck, KernelType::Spk])
                    .with_range(0.0, 1000.0),
            )
            .unwrap();
        assert_eq!(result["ck_quality"], json!("smithed"));
        assert_eq!(result["spk_quality"], json!("predicted"));
        assert_eq!(result["lro_spk_quality"], json!("predicted"));
    }

    #[test]
    fn test_limit_keeps_highest_ids() {
        let f = fixture();
        let query = SearchQuery::new(["lro"])
            .with_types([KernelType::Spk])
            .with_range(25.0, 30.0);
        let all = f.db.search(&query).unwrap();
        assert_eq!(all["spk"], json!(["spk/p1.bsp", "spk/p2.bsp", "spk/p3.bsp"]));

        let limited = f.db.search(&query.with_limit_spk(2)).unwrap();
        assert_eq!(limited["spk"], json!(["spk/p2.bsp", "spk/p3.bsp"]));
    }

    #[test]
    fn test_static_and_full_path() {
        let f = fixture();
        let query = SearchQuery::new(["lro"]).with_types([KernelType::Fk, KernelType::Ik]);
        let result = f.db.search(&query).unwrap();
        assert_eq!(result, json!({"fk": ["fk/lro_frames_v02.tf"]}));

        let result = f.db.search(&query.with_full_path(true)).unwrap();
        let path = result["fk"][0].as_str().unwrap();
        assert!(path.starts_with(&*f.db.data_root().to_string_lossy()));
        assert!(path.ends_with("fk/lro_frames_v02.tf"));
    }

    #[test]
    fn test_multi_name_merge() {
        let f = fixture();
        let query = SearchQuery::new(["lro", "mro"])
            .with_types([KernelType::Ck])
            .with_range(12.0, 16.0)
            .with_ck_qualities([Quality::Reconstructed]);

        let union = f.db.search(&query).unwrap();
        assert_eq!(union["ck"], json!(["ck/recon_a.bc", "ck/mro.bc"]));
        assert_eq!(union["lro_ck_quality"], json!("reconstructed"));
        assert_eq!(union["mro_ck_quality"], json!("reconstructed"));

        let overwritten = f.db.search(&query.with_overwrite(true)).unwrap();
        assert_eq!(overwritten["ck"], json!(["ck/recon_a.bc", "ck/mro.bc"]));

        let reversed = SearchQuery::new(["mro", "lro"])
            .with_types([KernelType::Ck])
            .with_range(12.0, 16.0)
            .with_ck_qualities([Quality::Reconstructed])
            .with_overwrite(true);
        assert_eq!(f.db.search(&reversed).unwrap()["ck"], json!(["ck/recon_a.bc"]));
    }

    #[test]
    fn test_unknown_name_contributes_nothing() {
        let f = fixture();
        let result = f.db.search(&SearchQuery::new(["mgs"])).unwrap();
        assert_eq!(result, json!({}));
    }
}
