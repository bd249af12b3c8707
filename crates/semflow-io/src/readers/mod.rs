//! Readers that turn persisted bytes or host files into `DataRecord`s.

pub mod files;
pub mod jsonl;
