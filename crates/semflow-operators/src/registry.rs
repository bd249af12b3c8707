//! Closed set of physical operator kinds.
//!
//! Every kind the planner can lower to is a variant here; dispatch is a
//! `match`, so adding a kind without handling it fails to compile.

use semflow_core::cost::OperatorCostEstimates;
use semflow_core::schema::SchemaRef;
use semflow_io::DataDirectory;

use crate::aggregate::{ApplyAverageAggregateOp, ApplyCountAggregateOp, ApplyGroupByOp};
use crate::cache::CachingStream;
use crate::convert::InduceFromCandidateOp;
use crate::filter::FilterCandidateOp;
use crate::limit::LimitScanOp;
use crate::scan::{CacheScanDataOp, MarshalAndScanDataOp};
use crate::traits::{OpError, PhysicalOperator, RecordStream};

/// Operator type names, in variant order.
pub const KIND_NAMES: &[&str] = &[
    "MarshalAndScanDataOp",
    "CacheScanDataOp",
    "InduceFromCandidateOp",
    "FilterCandidateOp",
    "ApplyGroupByOp",
    "ApplyCountAggregateOp",
    "ApplyAverageAggregateOp",
    "LimitScanOp",
];

#[derive(Debug)]
pub enum PhysicalOp {
    MarshalAndScan(MarshalAndScanDataOp),
    CacheScan(CacheScanDataOp),
    Convert(InduceFromCandidateOp),
    Filter(FilterCandidateOp),
    GroupBy(ApplyGroupByOp),
    Count(ApplyCountAggregateOp),
    Average(ApplyAverageAggregateOp),
    Limit(LimitScanOp),
}

impl PhysicalOp {
    pub fn as_operator(&self) -> &dyn PhysicalOperator {
        match self {
            PhysicalOp::MarshalAndScan(op) => op,
            PhysicalOp::CacheScan(op) => op,
            PhysicalOp::Convert(op) => op,
            PhysicalOp::Filter(op) => op,
            PhysicalOp::GroupBy(op) => op,
            PhysicalOp::Count(op) => op,
            PhysicalOp::Average(op) => op,
            PhysicalOp::Limit(op) => op,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, PhysicalOp::MarshalAndScan(_) | PhysicalOp::CacheScan(_))
    }

    pub fn op_name(&self) -> &'static str {
        self.as_operator().op_name()
    }

    pub fn output_schema(&self) -> &SchemaRef {
        self.as_operator().output_schema()
    }

    pub fn input_schema(&self) -> Option<&SchemaRef> {
        self.as_operator().input_schema()
    }

    pub fn identity(&self, plan_position: Option<usize>) -> String {
        self.as_operator().identity(plan_position)
    }

    pub fn cost_estimate(
        &self,
        ctx: &DataDirectory,
        source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        self.as_operator().cost_estimate(ctx, source)
    }

    pub fn max_workers(&self) -> usize {
        self.as_operator().max_workers()
    }

    pub fn should_profile(&self) -> bool {
        self.as_operator().should_profile()
    }

    pub fn target_cache_id(&self) -> Option<&str> {
        self.as_operator().target_cache_id()
    }

    pub fn describe(&self) -> String {
        self.as_operator().describe()
    }

    /// Execute, teeing output into the operator's cache target when caching
    /// is enabled for the run.
    pub fn execute<'a>(
        &'a self,
        ctx: &'a DataDirectory,
        input: Option<RecordStream<'a>>,
    ) -> Result<RecordStream<'a>, OpError> {
        let stream = self.as_operator().execute(ctx, input)?;
        match self.target_cache_id() {
            Some(id) if !ctx.config().no_cache => {
                Ok(Box::new(CachingStream::open(ctx, id, stream)?))
            }
            _ => Ok(stream),
        }
    }
}

/// Same kind and same configuration.
impl PartialEq for PhysicalOp {
    fn eq(&self, other: &Self) -> bool {
        self.op_name() == other.op_name()
            && self.as_operator().op_config() == other.as_operator().op_config()
    }
}

macro_rules! impl_from_op {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for PhysicalOp {
            fn from(op: $ty) -> Self {
                PhysicalOp::$variant(op)
            }
        })*
    };
}

impl_from_op! {
    MarshalAndScanDataOp => MarshalAndScan,
    CacheScanDataOp => CacheScan,
    InduceFromCandidateOp => Convert,
    FilterCandidateOp => Filter,
    ApplyGroupByOp => GroupBy,
    ApplyCountAggregateOp => Count,
    ApplyAverageAggregateOp => Average,
    LimitScanOp => Limit,
}
