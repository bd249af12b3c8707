#![forbid(unsafe_code)]
//! semflow-core: the data model shared by every semflow crate.
//!
//! - `schema`/`record`/`types`: typed record shells and their values
//! - `aggregate`: aggregate functions and group-by signatures
//! - `cost`/`stats`: per-operator cost estimates and per-record profiling
//! - `hash`: stable content hashing (operator identities, cache ids, manifests)
//! - `config`: process-wide tunables, loaded once per run
//!
//! No I/O lives here; `semflow-io` owns the dataset registry and caches.

pub mod aggregate;
pub mod config;
pub mod cost;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod record;
pub mod schema;
pub mod stats;
pub mod types;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
