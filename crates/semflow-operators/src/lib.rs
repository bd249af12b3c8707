#![forbid(unsafe_code)]
//! semflow-operators: executable counterparts of logical pipeline steps.
//!
//! Design intent:
//! - Pull-based and synchronous: every operator turns an upstream
//!   `RecordStream` (or the `DataDirectory`, for sources) into a lazy stream.
//! - Each operator exposes a stable identity, a naive cost estimate, and the
//!   schemas it consumes/produces.
//! - `PhysicalOp` is the closed set of operator kinds; nothing is discovered
//!   at runtime.

pub mod aggregate;
pub mod cache;
pub mod convert;
pub mod filter;
pub mod limit;
pub mod registry;
pub mod scan;
pub mod traits;

pub use aggregate::{ApplyAverageAggregateOp, ApplyCountAggregateOp, ApplyGroupByOp};
pub use cache::CachingStream;
pub use convert::{Cardinality, InduceFromCandidateOp};
pub use filter::FilterCandidateOp;
pub use limit::LimitScanOp;
pub use registry::PhysicalOp;
pub use scan::{CacheScanDataOp, MarshalAndScanDataOp};
pub use traits::{OpError, PhysicalOperator, RecordStream, RecordWithStats};
