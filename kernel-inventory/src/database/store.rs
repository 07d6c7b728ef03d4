//! Single-file keyed binary store.
//!
//! Layout:
//!
//! ```text
//! +----------+-----------+------------+--------------------+-------+--------------+
//! | KINVSTOR | version   | created_at | bincode blobs ...  | index | index offset |
//! | 8 bytes  | u32 LE    | u64 LE     |                    |       | u64 LE       |
//! +----------+-----------+------------+--------------------+-------+--------------+
//! ```
//!
//! The index is a bincode `BTreeMap<String, (offset, len)>`. Readers open
//! the file read-only and decode only the blobs they ask for. Writers build
//! the whole file in a temporary sibling and rename it over the old store.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Magic bytes at the start of every store.
pub const STORE_MAGIC: &[u8; 8] = b"KINVSTOR";

/// Current store format version.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: u64 = 8 + 4 + 8;
const TRAILER_LEN: u64 = 8;

/// Errors reading or writing the keyed store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store file does not exist.
    #[error("kernel database {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// The store exists but has no entry for the key.
    #[error("key [{key}] does not exist in {}", path.display())]
    KeyNotFound { key: String, path: PathBuf },

    /// The store or an entry could not be decoded.
    #[error("failed to read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    /// The store was written by an incompatible format version.
    #[error("{} has format version {found}, expected {expected}; rebuild the database", path.display())]
    FormatMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// I/O failure while reading or writing the store.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

type EntryIndex = BTreeMap<String, (u64, u64)>;

/// Collects encoded entries and writes them as one store file.
#[derive(Debug, Default)]
pub struct StoreWriter {
    entries: BTreeMap<String, Vec<u8>>,
}

impl StoreWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `value` under `key`, replacing any previous entry.
    pub fn put<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<(), StoreError> {
        let key = key.into();
        let bytes = bincode::serialize(value).map_err(|e| StoreError::Unreadable {
            path: PathBuf::from(&key),
            reason: format!("failed to encode entry: {}", e),
        })?;
        self.entries.insert(key, bytes);
        Ok(())
    }

    /// Store already-encoded bytes under `key`, e.g. an entry copied from
    /// [`StoreReader::get_raw`].
    pub fn put_raw(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(key.into(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry to `path`, atomically replacing an existing store.
    pub fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        // Write to temp file first, then rename for atomicity
        let temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer.write_all(STORE_MAGIC).map_err(io_err)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes()).map_err(io_err)?;
            writer.write_all(&unix_now().to_le_bytes()).map_err(io_err)?;

            let mut index = EntryIndex::new();
            let mut offset = HEADER_LEN;
            for (key, bytes) in &self.entries {
                writer.write_all(bytes).map_err(io_err)?;
                index.insert(key.clone(), (offset, bytes.len() as u64));
                offset += bytes.len() as u64;
            }

            let encoded = bincode::serialize(&index).map_err(|e| StoreError::Unreadable {
                path: path.to_path_buf(),
                reason: format!("failed to encode index: {}", e),
            })?;
            writer.write_all(&encoded).map_err(io_err)?;
            writer.write_all(&offset.to_le_bytes()).map_err(io_err)?;
            writer.flush().map_err(io_err)?;
        }
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(path).map_err(|e| io_err(e.error))?;

        info!(path = %path.display(), entries = self.entries.len(), "Wrote kernel database");
        Ok(())
    }
}

/// Read-only view of a store file.
#[derive(Debug)]
pub struct StoreReader {
    path: PathBuf,
    file: Mutex<File>,
    format_version: u32,
    created_at: u64,
    /// End of the blob region, where the index starts.
    data_end: u64,
    index: EntryIndex,
}

impl StoreReader {
    /// Open the store at `path` and read its header and index.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let io_err = |source: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let unreadable = |reason: String| StoreError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();
        if file_len < HEADER_LEN + TRAILER_LEN {
            return Err(unreadable(format!("file is truncated ({} bytes)", file_len)));
        }

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header).map_err(io_err)?;
        if &header[0..8] != STORE_MAGIC {
            return Err(unreadable("not a kernel database".to_string()));
        }
        let format_version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if format_version != FORMAT_VERSION {
            return Err(StoreError::FormatMismatch {
                path: path.to_path_buf(),
                found: format_version,
                expected: FORMAT_VERSION,
            });
        }
        let mut created = [0u8; 8];
        created.copy_from_slice(&header[12..20]);
        let created_at = u64::from_le_bytes(created);

        file.seek(SeekFrom::Start(file_len - TRAILER_LEN)).map_err(io_err)?;
        let mut trailer = [0u8; TRAILER_LEN as usize];
        file.read_exact(&mut trailer).map_err(io_err)?;
        let index_offset = u64::from_le_bytes(trailer);
        if index_offset < HEADER_LEN || index_offset > file_len - TRAILER_LEN {
            return Err(unreadable(format!("index offset {} out of range", index_offset)));
        }

        file.seek(SeekFrom::Start(index_offset)).map_err(io_err)?;
        let mut encoded = vec![0u8; (file_len - TRAILER_LEN - index_offset) as usize];
        file.read_exact(&mut encoded).map_err(io_err)?;
        let index: EntryIndex = bincode::deserialize(&encoded)
            .map_err(|e| unreadable(format!("corrupt index: {}", e)))?;

        debug!(path = %path.display(), entries = index.len(), "Opened kernel database");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            format_version,
            created_at,
            data_end: index_offset,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Creation time, seconds since the Unix epoch.
    pub fn created_at_secs(&self) -> u64 {
        self.created_at
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.created_at)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// All keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Encoded size of the entry under `key`.
    pub fn entry_len(&self, key: &str) -> Option<u64> {
        self.index.get(key).map(|&(_, len)| len)
    }

    /// Decode the entry under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StoreError> {
        let bytes = self.get_raw(key)?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::Unreadable {
            path: self.path.clone(),
            reason: format!("failed to decode key [{}]: {}", key, e),
        })
    }

    /// Encoded bytes of the entry under `key`.
    pub fn get_raw(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let &(offset, len) = self.index.get(key).ok_or_else(|| StoreError::KeyNotFound {
            key: key.to_string(),
            path: self.path.clone(),
        })?;
        let in_bounds = offset >= HEADER_LEN
            && offset.checked_add(len).is_some_and(|end| end <= self.data_end);
        if !in_bounds {
            return Err(StoreError::Unreadable {
                path: self.path.clone(),
                reason: format!(
                    "entry [{}] at {}+{} lies outside the data region",
                    key, offset, len
                ),
            });
        }
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let mut bytes = vec![0u8; len as usize];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
        file.read_exact(&mut bytes).map_err(io_err)?;
        Ok(bytes)
    }
}

/// Open the store at `store_path` and decode a single entry.
pub fn get_key<T: DeserializeOwned>(store_path: &Path, key: &str) -> Result<T, StoreError> {
    StoreReader::open(store_path)?.get(key)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
