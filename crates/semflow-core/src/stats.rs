//! Per-record profiling statistics emitted alongside every record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOpStats {
    pub record_id: Uuid,
    pub record_parent_id: Option<Uuid>,
    pub op_id: String,
    pub op_name: String,
    /// Seconds spent producing this record inside the operator.
    pub op_time: f64,
    /// USD spent producing this record.
    pub op_cost: f64,
    pub output_tokens: f64,
}

impl RecordOpStats {
    pub fn new(
        record_id: Uuid,
        record_parent_id: Option<Uuid>,
        op_id: impl Into<String>,
        op_name: impl Into<String>,
        op_time: f64,
    ) -> Self {
        Self {
            record_id,
            record_parent_id,
            op_id: op_id.into(),
            op_name: op_name.into(),
            op_time,
            op_cost: 0.0,
            output_tokens: 0.0,
        }
    }

    pub fn with_cost(mut self, op_cost: f64, output_tokens: f64) -> Self {
        self.op_cost = op_cost;
        self.output_tokens = output_tokens;
        self
    }
}
