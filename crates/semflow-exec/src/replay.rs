//! Deterministic replay & provenance helpers.
//!
//! The plan hash covers the ordered positional operator identities, which
//! already fold in every operator's configuration. Output digests hash the
//! records' field values only, so two runs producing the same records agree
//! regardless of record ids.

use semflow_core::hash::{canonical_json, hash_serde, hash_str, Hash256};
use semflow_core::record::DataRecord;
use semflow_planner::PhysicalPlan;

use crate::ExecError;

pub fn hash_plan(plan: &PhysicalPlan) -> Result<Hash256, ExecError> {
    hash_serde(&plan.identities()).map_err(|e| ExecError::Hash(e.to_string()))
}

pub fn hash_outputs(records: &[DataRecord]) -> Hash256 {
    let mut buf = String::new();
    for r in records {
        buf.push_str(&canonical_json(&r.as_json()));
        buf.push('\n');
    }
    hash_str(&buf)
}
