//! Physical plans: logical plans lowered onto concrete operators.
//!
//! Lowering asks the solver how each convert, filter and aggregate runs, so
//! two equal logical plans always lower to equal physical plans. Operators
//! are numbered by plan position in their identities.

use serde::{Deserialize, Serialize};
use tracing::debug;

use semflow_core::aggregate::AggFunc;
use semflow_core::hash::hash_serde;
use semflow_core::schema::SchemaRef;
use semflow_solver::Solver;
use semflow_operators::{
    ApplyAverageAggregateOp, ApplyCountAggregateOp, ApplyGroupByOp, CacheScanDataOp,
    FilterCandidateOp, InduceFromCandidateOp, LimitScanOp, MarshalAndScanDataOp, PhysicalOp,
};

use crate::error::{PlanError, Result};
use crate::logical::{LogicalOperator, LogicalPlan};

/// Knobs applied to every operator of a lowered plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowerOptions {
    /// Cap on records emitted by the source.
    pub num_samples: Option<usize>,
    /// Source records skipped before the first emitted one.
    pub scan_start_idx: usize,
    pub max_workers: usize,
    pub profiling: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            num_samples: None,
            scan_start_idx: 0,
            max_workers: 1,
            profiling: false,
        }
    }
}

#[derive(Debug)]
pub struct PhysicalPlan {
    pub operators: Vec<PhysicalOp>,
    pub dataset_id: String,
}

impl PhysicalPlan {
    pub fn output_schema(&self) -> Option<&SchemaRef> {
        self.operators.last().map(|op| op.output_schema())
    }

    /// Operator identities, each salted with its plan position.
    pub fn identities(&self) -> Vec<String> {
        self.operators
            .iter()
            .enumerate()
            .map(|(pos, op)| op.identity(Some(pos)))
            .collect()
    }

    /// Stable hash over the positional identities.
    pub fn plan_hash(&self) -> Result<String> {
        Ok(hash_serde(&self.identities())?.to_hex())
    }

    /// One line per operator, source first.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (pos, op) in self.operators.iter().enumerate() {
            out.push_str(&format!(
                "{pos:>2}. [{}] {}\n",
                op.identity(Some(pos)),
                op.describe()
            ));
        }
        out
    }
}

fn lower_operator(
    solver: &Solver,
    op: &LogicalOperator,
    opts: &LowerOptions,
) -> Result<PhysicalOp> {
    let physical: PhysicalOp = match op {
        LogicalOperator::BaseScan {
            dataset_id,
            output_schema,
        } => MarshalAndScanDataOp::new(output_schema.clone(), dataset_id.clone())
            .with_num_samples(opts.num_samples)
            .with_scan_start_idx(opts.scan_start_idx)
            .with_profiling(opts.profiling)
            .into(),
        LogicalOperator::CacheScan {
            cache_id,
            output_schema,
        } => CacheScanDataOp::new(output_schema.clone(), cache_id.clone())
            .with_num_samples(opts.num_samples)
            .with_scan_start_idx(opts.scan_start_idx)
            .with_profiling(opts.profiling)
            .into(),
        LogicalOperator::ConvertScan {
            input_schema,
            output_schema,
            cardinality,
            target_cache_id,
            ..
        } => InduceFromCandidateOp::synthesize(solver, output_schema.clone(), input_schema.clone())
            .with_cardinality(*cardinality)
            .with_target_cache_id(target_cache_id.clone())
            .with_max_workers(opts.max_workers)
            .with_profiling(opts.profiling)
            .into(),
        LogicalOperator::FilteredScan {
            output_schema,
            conditions,
            target_cache_id,
            ..
        } => FilterCandidateOp::synthesize(solver, output_schema.clone(), conditions.clone())
            .with_target_cache_id(target_cache_id.clone())
            .with_max_workers(opts.max_workers)
            .with_profiling(opts.profiling)
            .into(),
        LogicalOperator::GroupByAggregate {
            input_schema,
            gby_sig,
            target_cache_id,
            ..
        } => ApplyGroupByOp::new(input_schema.clone(), gby_sig.clone())
            .with_target_cache_id(target_cache_id.clone())
            .with_profiling(opts.profiling)
            .into(),
        LogicalOperator::ApplyAggregateFunction {
            input_schema,
            func: AggFunc::Count,
            target_cache_id,
            ..
        } => ApplyCountAggregateOp::synthesize(solver, input_schema.clone())?
            .with_target_cache_id(target_cache_id.clone())
            .with_profiling(opts.profiling)
            .into(),
        LogicalOperator::ApplyAggregateFunction {
            input_schema,
            func: AggFunc::Average,
            target_cache_id,
            ..
        } => ApplyAverageAggregateOp::new(input_schema.clone())?
            .with_target_cache_id(target_cache_id.clone())
            .with_profiling(opts.profiling)
            .into(),
        LogicalOperator::LimitScan {
            output_schema,
            limit,
            target_cache_id,
            ..
        } => LimitScanOp::new(output_schema.clone(), *limit)
            .with_target_cache_id(target_cache_id.clone())
            .with_profiling(opts.profiling)
            .into(),
    };
    Ok(physical)
}

/// Lower one validated logical plan.
pub fn lower_to_physical(
    solver: &Solver,
    plan: &LogicalPlan,
    opts: &LowerOptions,
) -> Result<PhysicalPlan> {
    plan.validate()?;
    let operators = plan
        .operators
        .iter()
        .map(|op| lower_operator(solver, op, opts))
        .collect::<Result<Vec<_>>>()?;
    Ok(PhysicalPlan {
        operators,
        dataset_id: plan.dataset_id.clone(),
    })
}

/// Lower every candidate logical plan, in order.
pub fn generate_physical_plans(
    solver: &Solver,
    plans: &[LogicalPlan],
    opts: &LowerOptions,
) -> Result<Vec<PhysicalPlan>> {
    if plans.is_empty() {
        return Err(PlanError::Contract("no logical plans to lower".into()));
    }
    let physical = plans
        .iter()
        .map(|p| lower_to_physical(solver, p, opts))
        .collect::<Result<Vec<_>>>()?;
    debug!(plans = physical.len(), "lowered physical plans");
    Ok(physical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semflow_core::schema::builtin;
    use semflow_solver::Services;

    fn scan(schema: SchemaRef) -> LogicalOperator {
        LogicalOperator::BaseScan {
            dataset_id: "d".into(),
            output_schema: schema,
        }
    }

    #[test]
    fn lowers_each_kind_in_order() {
        let solver = Solver::new(Services::default());
        let plan = LogicalPlan::new(
            vec![
                scan(builtin::file()),
                LogicalOperator::ConvertScan {
                    input_schema: builtin::file(),
                    output_schema: builtin::text_file(),
                    cardinality: Default::default(),
                    depends_on: None,
                    target_cache_id: Some("c1".into()),
                },
                LogicalOperator::LimitScan {
                    input_schema: builtin::text_file(),
                    output_schema: builtin::text_file(),
                    limit: 2,
                    target_cache_id: None,
                },
                LogicalOperator::ApplyAggregateFunction {
                    input_schema: builtin::text_file(),
                    output_schema: builtin::number(),
                    func: AggFunc::Count,
                    target_cache_id: None,
                },
            ],
            "d",
        );
        let physical = lower_to_physical(&solver, &plan, &LowerOptions::default()).unwrap();
        let names: Vec<_> = physical.operators.iter().map(|o| o.op_name()).collect();
        assert_eq!(
            names,
            vec![
                "MarshalAndScanDataOp",
                "InduceFromCandidateOp",
                "LimitScanOp",
                "ApplyCountAggregateOp"
            ]
        );
        assert_eq!(physical.operators[1].target_cache_id(), Some("c1"));
        assert_eq!(physical.identities().len(), 4);
        assert_eq!(physical.describe().lines().count(), 4);
    }

    #[test]
    fn identities_are_stable_and_positional() {
        let solver = Solver::new(Services::default());
        let plan = LogicalPlan::new(
            vec![
                scan(builtin::number()),
                LogicalOperator::LimitScan {
                    input_schema: builtin::number(),
                    output_schema: builtin::number(),
                    limit: 1,
                    target_cache_id: None,
                },
                LogicalOperator::LimitScan {
                    input_schema: builtin::number(),
                    output_schema: builtin::number(),
                    limit: 1,
                    target_cache_id: None,
                },
            ],
            "d",
        );
        let opts = LowerOptions::default();
        let a = lower_to_physical(&solver, &plan, &opts).unwrap();
        let b = lower_to_physical(&solver, &plan, &opts).unwrap();
        assert_eq!(a.identities(), b.identities());
        assert_eq!(a.plan_hash().unwrap(), b.plan_hash().unwrap());
        let ids = a.identities();
        assert_ne!(ids[1], ids[2]);
    }

    #[test]
    fn invalid_or_empty_input_is_rejected() {
        let solver = Solver::new(Services::default());
        assert!(generate_physical_plans(&solver, &[], &LowerOptions::default()).is_err());
        let headless = LogicalPlan::new(
            vec![LogicalOperator::LimitScan {
                input_schema: builtin::number(),
                output_schema: builtin::number(),
                limit: 1,
                target_cache_id: None,
            }],
            "d",
        );
        assert!(lower_to_physical(&solver, &headless, &LowerOptions::default()).is_err());
    }
}
