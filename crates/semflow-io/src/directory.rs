//! `DataDirectory`: the per-run context object.
//!
//! Holds the run's `EngineConfig`, the registered datasets, and the named
//! cache targets. Created once per run and passed by reference into the
//! planner, solver and operators; dropped when the run ends.
//!
//! Cache lifecycle: `open_cache` starts a partial segment, `append_cache`
//! adds one record per call, `close_cache` publishes it. Only published
//! segments are visible to `has_cached_answer` / `get_cached_result`; a
//! stream that stopped early leaves its partial segment unpublished.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use semflow_core::config::EngineConfig;
use semflow_core::record::DataRecord;
use semflow_core::schema::SchemaRef;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::readers::{files, jsonl as jsonl_reader};
use crate::storage::{FsStorage, MemoryStorage, Storage};
use crate::writers::jsonl::encode_record;

/// Lazy stream of records read through the directory.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<DataRecord>> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Memory,
    File,
    Dir,
}

#[derive(Debug, Clone)]
enum Registered {
    Memory {
        schema: SchemaRef,
        records: Vec<DataRecord>,
    },
    File(PathBuf),
    Dir(PathBuf),
}

pub struct DataDirectory {
    config: EngineConfig,
    storage: Arc<dyn Storage>,
    datasets: BTreeMap<String, Registered>,
    open_caches: Mutex<HashSet<String>>,
}

impl DataDirectory {
    pub fn new(config: EngineConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            storage,
            datasets: BTreeMap::new(),
            open_caches: Mutex::new(HashSet::new()),
        }
    }

    /// Caches persist under `config.cache_dir` on the local filesystem.
    pub fn with_fs(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(FsStorage::new()))
    }

    /// Caches live only as long as this directory.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(MemoryStorage::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    // ---------------- registration ----------------

    pub fn register_records(
        &mut self,
        id: impl Into<String>,
        schema: SchemaRef,
        records: Vec<DataRecord>,
    ) -> Result<()> {
        let id = id.into();
        if let Some(bad) = records.iter().find(|r| r.schema_name() != schema.name) {
            return Err(Error::Config(format!(
                "dataset '{id}' declared as {} but holds a {} record",
                schema.name,
                bad.schema_name()
            )));
        }
        self.insert(id, Registered::Memory { schema, records });
        Ok(())
    }

    pub fn register_file(&mut self, id: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Config(format!("{} is not a file", path.display())));
        }
        self.insert(id.into(), Registered::File(path.to_path_buf()));
        Ok(())
    }

    pub fn register_dir(&mut self, id: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::Config(format!("{} is not a directory", path.display())));
        }
        self.insert(id.into(), Registered::Dir(path.to_path_buf()));
        Ok(())
    }

    /// Register a file or a directory, whichever `path` is.
    pub fn register_path(&mut self, id: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        if path.as_ref().is_dir() {
            self.register_dir(id, path)
        } else {
            self.register_file(id, path)
        }
    }

    fn insert(&mut self, id: String, reg: Registered) {
        if self.datasets.contains_key(&id) {
            warn!(dataset = %id, "replacing registered dataset");
        }
        debug!(dataset = %id, "registered dataset");
        self.datasets.insert(id, reg);
    }

    fn lookup(&self, id: &str) -> Result<&Registered> {
        self.datasets
            .get(id)
            .ok_or_else(|| Error::UnknownDataset(id.to_string()))
    }

    // ---------------- dataset reads ----------------

    pub fn get_registered_dataset_type(&self, id: &str) -> Result<DatasetKind> {
        Ok(match self.lookup(id)? {
            Registered::Memory { .. } => DatasetKind::Memory,
            Registered::File(_) => DatasetKind::File,
            Registered::Dir(_) => DatasetKind::Dir,
        })
    }

    pub fn get_cardinality(&self, id: &str) -> Result<usize> {
        Ok(match self.lookup(id)? {
            Registered::Memory { records, .. } => records.len(),
            Registered::File(_) => 1,
            Registered::Dir(dir) => files::list_files(dir)?.len(),
        })
    }

    /// Total size in bytes.
    pub fn get_size(&self, id: &str) -> Result<u64> {
        Ok(match self.lookup(id)? {
            Registered::Memory { records, .. } => records
                .iter()
                .map(|r| r.as_json().to_string().len() as u64)
                .sum(),
            Registered::File(path) => std::fs::metadata(path)?.len(),
            Registered::Dir(dir) => files::total_size(&files::list_files(dir)?)?,
        })
    }

    /// Lazy, restartable scan: every call starts from the first record.
    pub fn get_registered_dataset(&self, id: &str) -> Result<RecordIter<'_>> {
        match self.lookup(id)? {
            Registered::Memory { records, .. } => Ok(Box::new(records.iter().cloned().map(Ok))),
            Registered::File(path) => Ok(Box::new(std::iter::once(files::read_file_record(path)))),
            Registered::Dir(dir) => {
                let paths = files::list_files(dir)?;
                Ok(Box::new(
                    paths.into_iter().map(|p| files::read_file_record(&p)),
                ))
            }
        }
    }

    // ---------------- cache side channel ----------------

    fn cache_path(&self, cache_id: &str) -> Result<String> {
        Ok(format!(
            "{}/{}.jsonl",
            self.config.cache_dir.trim_end_matches('/'),
            checked_cache_id(cache_id)?
        ))
    }

    fn partial_path(&self, cache_id: &str) -> Result<String> {
        Ok(format!("{}.partial", self.cache_path(cache_id)?))
    }

    fn open_set(&self) -> Result<MutexGuard<'_, HashSet<String>>> {
        self.open_caches
            .lock()
            .map_err(|_| Error::Storage("open cache set lock poisoned".into()))
    }

    /// True only for caches that were closed after a complete pass.
    pub fn has_cached_answer(&self, cache_id: &str) -> Result<bool> {
        self.storage.exists(&self.cache_path(cache_id)?)
    }

    pub fn get_cached_result(&self, cache_id: &str) -> Result<RecordIter<'_>> {
        let records = self.read_cache(cache_id)?;
        Ok(Box::new(records.into_iter().map(Ok)))
    }

    pub fn get_cached_cardinality(&self, cache_id: &str) -> Result<usize> {
        Ok(self.read_cache(cache_id)?.len())
    }

    pub fn get_cached_size(&self, cache_id: &str) -> Result<u64> {
        let path = self.cache_path(cache_id)?;
        if !self.storage.exists(&path)? {
            return Err(Error::CacheNotFound(cache_id.to_string()));
        }
        self.storage.size(&path)
    }

    fn read_cache(&self, cache_id: &str) -> Result<Vec<DataRecord>> {
        let path = self.cache_path(cache_id)?;
        if !self.storage.exists(&path)? {
            return Err(Error::CacheNotFound(cache_id.to_string()));
        }
        jsonl_reader::decode_records(&self.storage.read(&path)?)
    }

    /// Start (or restart) a cache target; any earlier partial segment is dropped.
    pub fn open_cache(&self, cache_id: &str) -> Result<()> {
        self.storage.write(&self.partial_path(cache_id)?, b"")?;
        self.open_set()?.insert(cache_id.to_string());
        debug!(cache = %cache_id, "opened cache");
        Ok(())
    }

    pub fn append_cache(&self, cache_id: &str, record: &DataRecord) -> Result<()> {
        if !self.open_set()?.contains(cache_id) {
            return Err(Error::CacheNotOpen(cache_id.to_string()));
        }
        self.storage
            .append(&self.partial_path(cache_id)?, encode_record(record)?.as_bytes())
    }

    /// Publish the cache so later runs can replay it.
    pub fn close_cache(&self, cache_id: &str) -> Result<()> {
        if !self.open_set()?.remove(cache_id) {
            return Err(Error::CacheNotOpen(cache_id.to_string()));
        }
        self.storage
            .rename(&self.partial_path(cache_id)?, &self.cache_path(cache_id)?)?;
        info!(cache = %cache_id, "closed cache");
        Ok(())
    }

    pub fn is_cache_open(&self, cache_id: &str) -> Result<bool> {
        Ok(self.open_set()?.contains(cache_id))
    }

    /// Remove a cache target, published or partial.
    pub fn clear_cache(&self, cache_id: &str) -> Result<()> {
        self.open_set()?.remove(cache_id);
        self.storage.delete(&self.partial_path(cache_id)?)?;
        self.storage.delete(&self.cache_path(cache_id)?)
    }
}

impl std::fmt::Debug for DataDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataDirectory")
            .field("datasets", &self.datasets.keys().collect::<Vec<_>>())
            .field("cache_dir", &self.config.cache_dir)
            .finish()
    }
}

/// Cache ids name files directly, so only `[A-Za-z0-9_-]` is accepted.
fn checked_cache_id(id: &str) -> Result<&str> {
    let safe = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if id.is_empty() || !safe {
        return Err(Error::Storage(format!("invalid cache id '{id}'")));
    }
    Ok(id)
}
