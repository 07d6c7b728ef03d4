//! The kernel database: time-indexed and static kernel sets per mission.
//!
//! # Keys
//!
//! | Key                                  | Value                       |
//! |--------------------------------------|-----------------------------|
//! | `{mission}/{type}/{quality}/kernels` | [`TimeIndexedKernelSet`]    |
//! | `{mission}/{type}/kernels`           | [`NonTimeKernelSet`]        |
//! | `required/kernels`                   | LSKs and SCLKs (relative)   |
//!
//! A [`Database`] either holds sets it built itself or hydrates them lazily
//! from the store the first time a key is asked for. Keys missing from the
//! store are remembered so repeated searches don't reopen it.

mod build;
mod store;
mod time_index;

pub use store::{get_key, StoreError, StoreReader, StoreWriter, FORMAT_VERSION, STORE_MAGIC};
pub use time_index::{
    InconsistentIndex, PersistedTimeSet, TimeIndexedKernelSet, TimeKey, COLLISION_EPSILON,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ConfigTree;
use crate::error::{InventoryError, Result};
use crate::kernel::{KernelType, Quality};
use crate::memo::Memo;
use crate::settings::InventorySettings;
use crate::toolkit::KernelToolkit;

/// Store key of the required kernel list.
pub const REQUIRED_KEY: &str = "required/kernels";

/// Store key of a time-indexed set. Mission names are case-insensitive.
pub fn time_set_key(mission: &str, kernel_type: KernelType, quality: Quality) -> String {
    format!("{}/{}/{}/kernels", mission.to_lowercase(), kernel_type, quality)
}

/// Store key of a static set.
pub fn static_set_key(mission: &str, kernel_type: KernelType) -> String {
    format!("{}/{}/kernels", mission.to_lowercase(), kernel_type)
}

/// Latest-version files of a static kernel type, relative to the data root.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonTimeKernelSet {
    file_paths: Vec<String>,
}

impl NonTimeKernelSet {
    pub fn new(file_paths: Vec<String>) -> Self {
        Self { file_paths }
    }

    pub fn file_paths(&self) -> &[String] {
        &self.file_paths
    }

    pub fn len(&self) -> usize {
        self.file_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_paths.is_empty()
    }
}

/// Options for [`Database::build`].
#[derive(Clone, Default)]
pub struct BuildOptions {
    /// Restrict the build to these missions; all missions when empty.
    pub missions: Vec<String>,
    /// Write the store once the build finishes.
    pub persist: bool,
    /// Memo shared with other components; a fresh in-memory one otherwise.
    pub memo: Option<Arc<Memo>>,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missions<I, S>(mut self, missions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.missions = missions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_memo(mut self, memo: Arc<Memo>) -> Self {
        self.memo = Some(memo);
        self
    }
}

/// Negative entries (`None`) record keys the store doesn't have.
type SetCache<T> = RwLock<HashMap<String, Option<Arc<T>>>>;

/// Kernel inventory for a data root.
#[derive(Debug)]
pub struct Database {
    settings: InventorySettings,
    store_path: PathBuf,
    time_sets: SetCache<TimeIndexedKernelSet>,
    static_sets: SetCache<NonTimeKernelSet>,
    required: RwLock<Option<Arc<Vec<String>>>>,
    reader: RwLock<Option<Arc<StoreReader>>>,
    /// Whether the store may hold entries that were never hydrated. Built
    /// databases replace the store wholesale.
    store_backed: bool,
}

impl Database {
    /// A database that hydrates sets from the store on demand.
    ///
    /// Nothing is read until the first lookup.
    pub fn open(settings: InventorySettings) -> Self {
        let store_path = settings.store_path();
        Self {
            settings,
            store_path,
            time_sets: RwLock::new(HashMap::new()),
            static_sets: RwLock::new(HashMap::new()),
            required: RwLock::new(None),
            reader: RwLock::new(None),
            store_backed: true,
        }
    }

    /// Read every set in the store up front.
    pub fn load(settings: InventorySettings) -> Result<Self> {
        let db = Self::open(settings);
        let reader = db.reader()?;

        let mut time_sets = HashMap::new();
        let mut static_sets = HashMap::new();
        for key in reader.keys() {
            if key == REQUIRED_KEY {
                continue;
            }
            match key.split('/').count() {
                4 => {
                    let set = decode_time_set(&reader, key)?;
                    time_sets.insert(key.to_string(), Some(Arc::new(set)));
                }
                3 => {
                    let set: NonTimeKernelSet = reader.get(key)?;
                    static_sets.insert(key.to_string(), Some(Arc::new(set)));
                }
                _ => warn!(key, "Ignoring unrecognized database key"),
            }
        }
        let required: Vec<String> = match reader.get(REQUIRED_KEY) {
            Ok(required) => required,
            Err(StoreError::KeyNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %db.store_path.display(),
            time_sets = time_sets.len(),
            static_sets = static_sets.len(),
            "Loaded kernel database"
        );
        *db.time_sets.write() = time_sets;
        *db.static_sets.write() = static_sets;
        *db.required.write() = Some(Arc::new(required));
        Ok(db)
    }

    /// Build the database from `config`, reading kernel coverage through
    /// `toolkit`.
    ///
    /// The cache directory is probed for writability before any work starts.
    pub fn build(
        config: &ConfigTree,
        settings: InventorySettings,
        toolkit: Arc<dyn KernelToolkit>,
        options: BuildOptions,
    ) -> Result<Self> {
        build::probe_writable(&settings.cache_dir)?;

        let memo = options.memo.clone().unwrap_or_default();
        let built = build::Builder::new(config, &settings, toolkit, memo)
            .build(&options.missions)?;

        let mut db = Self::open(settings);
        db.store_backed = false;
        *db.time_sets.write() = built
            .time_sets
            .into_iter()
            .map(|(k, v)| (k, Some(Arc::new(v))))
            .collect();
        *db.static_sets.write() = built
            .static_sets
            .into_iter()
            .map(|(k, v)| (k, Some(Arc::new(v))))
            .collect();
        *db.required.write() = Some(Arc::new(built.required));

        if options.persist {
            db.write()?;
        }
        Ok(db)
    }

    pub fn settings(&self) -> &InventorySettings {
        &self.settings
    }

    pub fn data_root(&self) -> &Path {
        &self.settings.data_root
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Persist every non-empty in-memory set, replacing the store atomically.
    ///
    /// For an opened database, entries that were never hydrated are copied
    /// over from the existing store unchanged.
    pub fn write(&self) -> Result<()> {
        let mut writer = StoreWriter::new();
        for (key, set) in self.time_sets.read().iter() {
            if let Some(set) = set.as_ref().filter(|s| !s.is_empty()) {
                writer.put(key.as_str(), &set.to_persisted())?;
            }
        }
        for (key, set) in self.static_sets.read().iter() {
            if let Some(set) = set.as_ref().filter(|s| !s.is_empty()) {
                writer.put(key.as_str(), &**set)?;
            }
        }
        if let Some(required) = self.required.read().as_ref() {
            writer.put(REQUIRED_KEY, &**required)?;
        }
        if self.store_backed {
            self.carry_forward(&mut writer)?;
        }

        writer.write_to(&self.store_path)?;
        // the old handle still points at the replaced file
        *self.reader.write() = None;
        Ok(())
    }

    /// Copy store entries with no in-memory counterpart into `writer`.
    fn carry_forward(&self, writer: &mut StoreWriter) -> Result<()> {
        let reader = match self.reader() {
            Ok(reader) => reader,
            Err(InventoryError::Store(StoreError::NotFound(_))) => return Ok(()),
            Err(e) => return Err(e),
        };
        let time_sets = self.time_sets.read();
        let static_sets = self.static_sets.read();
        let mut copied = 0usize;
        for key in reader.keys() {
            // hydrated entries, empty or not, are already decided
            if writer.contains(key) || time_sets.contains_key(key) || static_sets.contains_key(key) {
                continue;
            }
            writer.put_raw(key, reader.get_raw(key)?);
            copied += 1;
        }
        debug!(copied, "Carried forward unhydrated entries");
        Ok(())
    }

    /// LSKs and SCLKs to load before working with clock-based kernels, as
    /// absolute paths.
    pub fn required_kernels(&self) -> Result<Vec<String>> {
        if let Some(required) = self.required.read().as_ref() {
            return Ok(self.absolute_all(required));
        }
        let required: Vec<String> = match self.hydrate(REQUIRED_KEY)? {
            Some(required) => required,
            None => Vec::new(),
        };
        let absolute = self.absolute_all(&required);
        *self.required.write() = Some(Arc::new(required));
        Ok(absolute)
    }

    /// The time-indexed set for `(mission, kernel_type, quality)`, hydrating
    /// it from the store when it isn't in memory.
    pub fn time_set(
        &self,
        mission: &str,
        kernel_type: KernelType,
        quality: Quality,
    ) -> Result<Option<Arc<TimeIndexedKernelSet>>> {
        let key = time_set_key(mission, kernel_type, quality);
        if let Some(cached) = self.time_sets.read().get(&key) {
            return Ok(cached.clone());
        }

        let set = match self.reader_if_available()? {
            Some(reader) => match decode_time_set(&reader, &key) {
                Ok(set) => Some(Arc::new(set)),
                Err(InventoryError::Store(StoreError::KeyNotFound { .. })) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        debug!(key = %key, found = set.is_some(), "Hydrated time-indexed set");
        self.time_sets.write().insert(key, set.clone());
        Ok(set)
    }

    /// The static set for `(mission, kernel_type)`, hydrating lazily.
    pub fn static_set(
        &self,
        mission: &str,
        kernel_type: KernelType,
    ) -> Result<Option<Arc<NonTimeKernelSet>>> {
        let key = static_set_key(mission, kernel_type);
        if let Some(cached) = self.static_sets.read().get(&key) {
            return Ok(cached.clone());
        }

        let set = self.hydrate::<NonTimeKernelSet>(&key)?.map(Arc::new);
        debug!(key = %key, found = set.is_some(), "Hydrated static set");
        self.static_sets.write().insert(key, set.clone());
        Ok(set)
    }

    /// Keys of every non-empty set held in memory, sorted.
    pub fn loaded_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .time_sets
            .read()
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(k, _)| k.clone())
            .chain(
                self.static_sets
                    .read()
                    .iter()
                    .filter(|(_, v)| v.is_some())
                    .map(|(k, _)| k.clone()),
            )
            .collect();
        keys.sort();
        keys
    }

    /// Absolute path of a stored relative path.
    pub fn absolute(&self, relative: &str) -> String {
        self.settings
            .data_root
            .join(relative)
            .to_string_lossy()
            .into_owned()
    }

    fn absolute_all(&self, relative: &[String]) -> Vec<String> {
        relative.iter().map(|p| self.absolute(p)).collect()
    }

    fn has_memory_data(&self) -> bool {
        self.time_sets.read().values().any(Option::is_some)
            || self.static_sets.read().values().any(Option::is_some)
    }

    /// Decode `key` from the store, `None` when the store lacks it.
    fn hydrate<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(reader) = self.reader_if_available()? else {
            return Ok(None);
        };
        match reader.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::KeyNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The store reader, or `None` when the store is missing but sets are
    /// already in memory.
    fn reader_if_available(&self) -> Result<Option<Arc<StoreReader>>> {
        match self.reader() {
            Ok(reader) => Ok(Some(reader)),
            Err(InventoryError::Store(StoreError::NotFound(path))) if self.has_memory_data() => {
                warn!(path = %path.display(), "Kernel database not found, using in-memory sets only");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn reader(&self) -> Result<Arc<StoreReader>> {
        if let Some(reader) = self.reader.read().as_ref() {
            return Ok(Arc::clone(reader));
        }
        let reader = Arc::new(StoreReader::open(&self.store_path)?);
        *self.reader.write() = Some(Arc::clone(&reader));
        Ok(reader)
    }
}

fn decode_time_set(reader: &StoreReader, key: &str) -> Result<TimeIndexedKernelSet> {
    let persisted: PersistedTimeSet = reader.get(key)?;
    TimeIndexedKernelSet::from_persisted(persisted).map_err(|e| {
        StoreError::Unreadable {
            path: reader.path().to_path_buf(),
            reason: format!("key [{}]: {}", key, e),
        }
        .into()
    })
}
