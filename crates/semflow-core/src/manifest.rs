//! Run manifest for audit/replay.
//!
//! The engine emits a manifest after executing a physical plan; the plan hash
//! is derived from operator identities, so identical plans hash identically
//! across runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Stable hash over the ordered operator identities of the executed plan.
    pub plan_hash: Hash256,

    /// Dataset the plan scanned.
    pub dataset_id: String,

    /// Engine version string for provenance.
    pub engine_version: String,

    pub records_out: u64,
    /// Sum of per-record operator cost (USD).
    pub total_cost: f64,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(plan_hash: Hash256, dataset_id: impl Into<String>, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            plan_hash,
            dataset_id: dataset_id.into(),
            engine_version: crate::VERSION.to_string(),
            records_out: 0,
            total_cost: 0.0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, records_out: u64, total_cost: f64) -> Self {
        self.finished_ms = finished_ms;
        self.records_out = records_out;
        self.total_cost = total_cost;
        self
    }
}
