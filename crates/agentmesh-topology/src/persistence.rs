//! Key-value persistence for topology state
//!
//! Topologies write a [`TopologyState`](crate::TopologyState) snapshot after
//! each lifecycle call, under [`state_key`]. Nothing on the delivery path
//! reads or writes the store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid key '{0}': use letters, digits, '-', '_' or '.'")]
    InvalidKey(String),

    #[error("Serialization failed for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Key under which a topology's state snapshot is kept
pub fn state_key(topology_id: &str) -> String {
    format!("topology.{}.state", topology_id)
}

fn validate_key(key: &str) -> PersistenceResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidKey(key.to_string()))
    }
}

/// Where topologies keep values that outlive a run
pub trait PersistenceStore: Send + Sync {
    fn store(&self, key: &str, value: Value) -> PersistenceResult<()>;

    /// `None` when the key was never stored or has been deleted
    fn load(&self, key: &str) -> PersistenceResult<Option<Value>>;

    /// Returns whether the key existed
    fn delete(&self, key: &str) -> PersistenceResult<bool>;

    fn clear(&self) -> PersistenceResult<()>;
}

/// Typed access on top of any [`PersistenceStore`]
pub trait PersistenceStoreExt: PersistenceStore {
    fn store_as<T: Serialize>(&self, key: &str, value: &T) -> PersistenceResult<()> {
        let value = serde_json::to_value(value).map_err(|source| PersistenceError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.store(key, value)
    }

    fn load_as<T: DeserializeOwned>(&self, key: &str) -> PersistenceResult<Option<T>> {
        self.load(key)?
            .map(|value| {
                serde_json::from_value(value).map_err(|source| PersistenceError::Serialization {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }
}

impl<S: PersistenceStore + ?Sized> PersistenceStoreExt for S {}

/// Process-local store; contents are lost on drop
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistenceStore for MemoryStore {
    fn store(&self, key: &str, value: Value) -> PersistenceResult<()> {
        validate_key(key)?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn load(&self, key: &str) -> PersistenceResult<Option<Value>> {
        validate_key(key)?;
        Ok(self.entries.get(key).map(|value| value.clone()))
    }

    fn delete(&self, key: &str) -> PersistenceResult<bool> {
        validate_key(key)?;
        Ok(self.entries.remove(key).is_some())
    }

    fn clear(&self) -> PersistenceResult<()> {
        self.entries.clear();
        Ok(())
    }
}

/// One `<key>.json` file per key in a directory, with a read cache
///
/// Writes go to a temporary file first and are renamed into place.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    cache: DashMap<String, Value>,
}

impl JsonFileStore {
    /// Use `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PersistenceError::Io {
            path: dir.clone(),
            source,
        })?;
        debug!(dir = %dir.display(), "Opened JSON file store");
        Ok(Self {
            dir,
            cache: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PersistenceResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl PersistenceStore for JsonFileStore {
    fn store(&self, key: &str, value: Value) -> PersistenceResult<()> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec_pretty(&value).map_err(|source| {
            PersistenceError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))?;

        self.cache.insert(key.to_string(), value);
        Ok(())
    }

    fn load(&self, key: &str) -> PersistenceResult<Option<Value>> {
        let path = self.path_for(key)?;
        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value.clone()));
        }

        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        let value: Value =
            serde_json::from_slice(&raw).map_err(|source| PersistenceError::Serialization {
                key: key.to_string(),
                source,
            })?;
        self.cache.insert(key.to_string(), value.clone());
        Ok(Some(value))
    }

    fn delete(&self, key: &str) -> PersistenceResult<bool> {
        let path = self.path_for(key)?;
        let cached = self.cache.remove(key).is_some();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(cached),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn clear(&self) -> PersistenceResult<()> {
        self.cache.clear();
        let entries = fs::read_dir(&self.dir).map_err(io_error(&self.dir))?;
        for entry in entries {
            let path = entry.map_err(io_error(&self.dir))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path).map_err(io_error(&path))?;
            }
        }
        Ok(())
    }
}
