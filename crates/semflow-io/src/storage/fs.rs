use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use super::Storage;
use crate::error::{Error, Result};

/// Local filesystem storage (rooted at the host filesystem).
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

fn ensure_parent(p: &Path) -> Result<()> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Storage(format!("mkparent: {e}")))?;
    }
    Ok(())
}

impl Storage for FsStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let p = Path::new(path);
        ensure_parent(p)?;
        let mut f = File::create(p).map_err(|e| Error::Storage(format!("create: {e}")))?;
        f.write_all(bytes)
            .map_err(|e| Error::Storage(format!("write: {e}")))?;
        f.flush()
            .map_err(|e| Error::Storage(format!("flush: {e}")))?;
        Ok(())
    }

    fn append(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let p = Path::new(path);
        ensure_parent(p)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(p)
            .map_err(|e| Error::Storage(format!("open append: {e}")))?;
        f.write_all(bytes)
            .map_err(|e| Error::Storage(format!("append: {e}")))?;
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let mut f =
            File::open(Path::new(path)).map_err(|e| Error::Storage(format!("open: {e}")))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)
            .map_err(|e| Error::Storage(format!("read: {e}")))?;
        Ok(buf)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let to_path = Path::new(to);
        ensure_parent(to_path)?;
        fs::rename(from, to_path).map_err(|e| Error::Storage(format!("rename: {e}")))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let p = Path::new(path);
        if p.exists() {
            fs::remove_file(p).map_err(|e| Error::Storage(format!("delete: {e}")))?;
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(Path::new(path).is_file())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix_path = Path::new(prefix);
        let mut results = Vec::new();

        if !prefix_path.exists() {
            return Ok(results);
        }

        if prefix_path.is_file() {
            if let Some(s) = prefix_path.to_str() {
                results.push(s.to_string());
            }
            return Ok(results);
        }

        fn visit_dirs(dir: &Path, results: &mut Vec<String>) -> std::io::Result<()> {
            if dir.is_dir() {
                for entry in fs::read_dir(dir)? {
                    let entry = entry?;
                    let path = entry.path();
                    if path.is_dir() {
                        visit_dirs(&path, results)?;
                    } else if let Some(s) = path.to_str() {
                        results.push(s.to_string());
                    }
                }
            }
            Ok(())
        }

        visit_dirs(prefix_path, &mut results)
            .map_err(|e| Error::Storage(format!("list: {e}")))?;
        results.sort();

        Ok(results)
    }

    fn size(&self, path: &str) -> Result<u64> {
        let meta = fs::metadata(Path::new(path)).map_err(|e| Error::Storage(format!("size: {e}")))?;
        Ok(meta.len())
    }
}
