#![forbid(unsafe_code)]
//! semflow-io: the only I/O boundary of the engine.
//!
//! - `directory`: `DataDirectory`, the per-run context holding config,
//!   registered datasets, and named cache targets
//! - `storage`: byte-level backends (`FsStorage`, `MemoryStorage`)
//! - `writers`/`readers`: JSONL record codec and file-to-record readers

pub mod directory;
pub mod error;
pub mod readers;
pub mod storage;
pub mod writers;

pub use directory::{DataDirectory, DatasetKind, RecordIter};
pub use error::{Error, Result};
pub use storage::{FsStorage, MemoryStorage, Storage};
