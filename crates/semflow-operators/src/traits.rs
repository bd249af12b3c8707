//! Operator trait + common interfaces.
//!
//! The planner calls `cost_estimate(...)` bottom-up to cost a plan; the exec
//! runtime calls `execute(...)` source-first to wire the lazy stream chain.

use serde_json::{Map, Value as Json};
use thiserror::Error;

use semflow_core::cost::{OperatorCostEstimates, MAX_OP_ID_CHARS};
use semflow_core::hash::{canonical_json, hash_str};
use semflow_core::record::DataRecord;
use semflow_core::schema::SchemaRef;
use semflow_core::stats::RecordOpStats;
use semflow_io::DataDirectory;
use semflow_solver::SolverError;

/// One emitted record plus the profiling stat of the operator that emitted it.
#[derive(Debug, Clone)]
pub struct RecordWithStats {
    pub record: DataRecord,
    pub stats: RecordOpStats,
}

/// Lazy, pull-based stream; dropping it is the only cancellation.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<RecordWithStats, OpError>> + 'a>;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("planning error: {0}")]
    Plan(String),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("{op} record missing expected field '{field}'")]
    MissingField { op: &'static str, field: String },

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] semflow_io::Error),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Trait that all physical operators implement.
///
/// Invariants:
/// - `identity` depends only on `op_config` and the plan position.
/// - `cost_estimate` returns a fresh value on every call.
/// - Sources take no upstream stream; every other operator takes exactly one.
pub trait PhysicalOperator: Send + Sync {
    /// Operator type name (stable; prefixes the identity).
    fn op_name(&self) -> &'static str;

    fn input_schema(&self) -> Option<&SchemaRef>;

    fn output_schema(&self) -> &SchemaRef;

    /// Configuration that distinguishes this operator from others of its kind.
    fn op_config(&self) -> Map<String, Json>;

    /// Stable id: `<Name>_<hash>` or `<Name>_<position>_<hash>`.
    fn identity(&self, plan_position: Option<usize>) -> String {
        compute_op_id(self.op_name(), self.op_config(), plan_position)
    }

    /// Naive estimate from dataset metadata (sources) or from the upstream
    /// estimate (everything else).
    fn cost_estimate(
        &self,
        ctx: &DataDirectory,
        source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError>;

    /// Parallelism hint for an engine that can fan out invocations.
    fn max_workers(&self) -> usize {
        1
    }

    fn should_profile(&self) -> bool;

    /// Named cache this operator's output is written to, if any.
    fn target_cache_id(&self) -> Option<&str> {
        None
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a DataDirectory,
        input: Option<RecordStream<'a>>,
    ) -> Result<RecordStream<'a>, OpError>;

    /// One-line human description used by `explain`.
    fn describe(&self) -> String {
        format!("{}({})", self.op_name(), self.output_schema())
    }
}

pub fn compute_op_id(
    op_name: &str,
    mut config: Map<String, Json>,
    plan_position: Option<usize>,
) -> String {
    config.insert("operator".into(), Json::from(op_name));
    if let Some(pos) = plan_position {
        config.insert("plan_position".into(), Json::from(pos));
    }
    let hash = hash_str(&canonical_json(&Json::Object(config))).short_hex(MAX_OP_ID_CHARS);
    match plan_position {
        Some(pos) => format!("{op_name}_{pos}_{hash}"),
        None => format!("{op_name}_{hash}"),
    }
}

pub(crate) fn require_source<'e>(
    op: &'static str,
    source: Option<&'e OperatorCostEstimates>,
) -> Result<&'e OperatorCostEstimates, OpError> {
    source.ok_or_else(|| OpError::Plan(format!("{op} needs an upstream cost estimate")))
}

pub(crate) fn require_input<'a>(
    op: &'static str,
    input: Option<RecordStream<'a>>,
) -> Result<RecordStream<'a>, OpError> {
    input.ok_or_else(|| OpError::Plan(format!("{op} expects one input stream")))
}

pub(crate) fn schema_config(key: &str, schema: &SchemaRef) -> (String, Json) {
    (key.to_string(), Json::from(schema.to_string()))
}
