#![forbid(unsafe_code)]
//! semflow-exec: runs a physical plan and reports what it cost.
//!
//! The engine chains operator streams source-first and pulls records from
//! the last one. Each operator's output passes through a profiling tap that
//! totals time, dollars and tokens; operators marked `should_profile` also
//! keep every per-record stat. A `RunManifest` with a stable plan hash
//! closes every run.

pub mod metrics;
pub mod replay;
pub mod runtime;

pub use runtime::{Engine, ExecError, OperatorProfile, RunOutput};
