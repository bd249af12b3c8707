//! Byte-level storage backends for cache targets.
//!
//! - `fs`: local filesystem (default)
//! - `memory`: `HashMap`-backed store for tests and ephemeral runs

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// Abstract storage interface for persisted record streams.
///
/// Paths are opaque `/`-separated keys; `FsStorage` maps them onto the host
/// filesystem, `MemoryStorage` onto map keys.
pub trait Storage: Send + Sync {
    /// Write bytes to a path, replacing any previous content. Creates parent
    /// directories if needed.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Append bytes to a path, creating it if missing.
    fn append(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read the whole content of a path.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Move `from` to `to`, replacing `to`.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Delete a path. Idempotent (no error if path doesn't exist).
    fn delete(&self, path: &str) -> Result<()>;

    fn exists(&self, path: &str) -> Result<bool>;

    /// List all paths under a prefix.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Size of a path in bytes.
    fn size(&self, path: &str) -> Result<u64>;
}
