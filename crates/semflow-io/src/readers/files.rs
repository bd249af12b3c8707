//! Host files as `File` records.
//!
//! A directory dataset yields one record per regular, non-hidden file directly
//! inside it, ordered by file name so repeated scans are stable.

use std::fs;
use std::path::{Path, PathBuf};

use semflow_core::record::DataRecord;
use semflow_core::schema::builtin;

use crate::error::Result;

/// Sorted regular files directly under `dir` (hidden files skipped).
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if path.is_file() && !hidden {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Read one file into a `File` record (`filename` is the base name).
pub fn read_file_record(path: &Path) -> Result<DataRecord> {
    let contents = fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    Ok(DataRecord::new(builtin::file())
        .with("filename", filename)
        .with("contents", contents))
}

/// Total byte size of the given files.
pub fn total_size(paths: &[PathBuf]) -> Result<u64> {
    let mut total = 0u64;
    for p in paths {
        total += fs::metadata(p)?.len();
    }
    Ok(total)
}
