//! In-memory storage backend.
//!
//! HashMap-based; used by tests and by runs that never persist caches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::Storage;
use crate::error::{Error, Result};

/// Thread-safe in-memory storage using a HashMap.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.data
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))
    }

    /// Number of stored objects.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}

impl Storage for MemoryStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn append(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.lock()?
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("path not found: {path}")))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut data = self.lock()?;
        let bytes = data
            .remove(from)
            .ok_or_else(|| Error::Storage(format!("path not found: {from}")))?;
        data.insert(to.to_string(), bytes);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.lock()?.remove(path);
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(path))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let data = self.lock()?;
        let mut result: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }

    fn size(&self, path: &str) -> Result<u64> {
        self.lock()?
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| Error::Storage(format!("path not found: {path}")))
    }
}
