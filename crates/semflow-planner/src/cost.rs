//! Whole-plan cost estimation and policy-based plan choice.
//!
//! Per-operator estimates are per record, so each operator's time and dollar
//! cost is scaled by the number of records it consumes (the upstream
//! cardinality; a source consumes what it emits). Quality multiplies.

use serde::{Deserialize, Serialize};
use tracing::debug;

use semflow_core::cost::OperatorCostEstimates;
use semflow_io::DataDirectory;

use crate::error::{PlanError, Result};
use crate::physical::PhysicalPlan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCost {
    pub total_time: f64,
    pub total_cost: f64,
    pub quality: f64,
    /// Estimated records out of the final operator.
    pub cardinality: f64,
    pub per_op: Vec<OperatorCostEstimates>,
}

pub fn estimate_plan_cost(ctx: &DataDirectory, plan: &PhysicalPlan) -> Result<PlanCost> {
    let mut per_op = Vec::with_capacity(plan.operators.len());
    let mut total_time = 0.0;
    let mut total_cost = 0.0;
    let mut quality = 1.0;

    for op in &plan.operators {
        let upstream = per_op.last().copied();
        let est = op.cost_estimate(ctx, upstream.as_ref())?;
        let consumed = upstream.map(|u| u.cardinality()).unwrap_or(est.cardinality());
        total_time += est.time_per_record() * consumed;
        total_cost += est.cost_per_record() * consumed;
        quality *= est.quality();
        per_op.push(est);
    }

    let cardinality = per_op.last().map(|e| e.cardinality()).unwrap_or(0.0);
    Ok(PlanCost {
        total_time,
        total_cost,
        quality,
        cardinality,
        per_op,
    })
}

/// What `choose_plan` optimizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    #[default]
    MaxQuality,
    MinCost,
    MinTime,
}

impl Policy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "max_quality" | "quality" => Some(Policy::MaxQuality),
            "min_cost" | "cost" => Some(Policy::MinCost),
            "min_time" | "time" => Some(Policy::MinTime),
            _ => None,
        }
    }

    /// True when `a` is strictly preferable to `b`.
    fn prefers(&self, a: &PlanCost, b: &PlanCost) -> bool {
        match self {
            Policy::MaxQuality => a.quality > b.quality,
            Policy::MinCost => a.total_cost < b.total_cost,
            Policy::MinTime => a.total_time < b.total_time,
        }
    }
}

/// Index of the best plan under `policy`; ties keep the earliest plan.
pub fn choose_plan(costs: &[PlanCost], policy: Policy) -> Result<usize> {
    let mut best = 0;
    let first = costs
        .first()
        .ok_or_else(|| PlanError::Contract("no plans to choose from".into()))?;
    let mut best_cost = first;
    for (i, cost) in costs.iter().enumerate().skip(1) {
        if policy.prefers(cost, best_cost) {
            best = i;
            best_cost = cost;
        }
    }
    debug!(?policy, chosen = best, candidates = costs.len(), "chose plan");
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semflow_core::config::EngineConfig;
    use semflow_core::record::DataRecord;
    use semflow_core::schema::builtin;
    use semflow_operators::{LimitScanOp, MarshalAndScanDataOp};

    fn cost(time: f64, usd: f64, quality: f64) -> PlanCost {
        PlanCost {
            total_time: time,
            total_cost: usd,
            quality,
            cardinality: 1.0,
            per_op: Vec::new(),
        }
    }

    #[test]
    fn policies_pick_their_objective_and_ties_keep_first() {
        let costs = vec![cost(3.0, 1.0, 0.9), cost(1.0, 2.0, 0.5), cost(2.0, 0.5, 0.9)];
        assert_eq!(choose_plan(&costs, Policy::MaxQuality).unwrap(), 0);
        assert_eq!(choose_plan(&costs, Policy::MinTime).unwrap(), 1);
        assert_eq!(choose_plan(&costs, Policy::MinCost).unwrap(), 2);
        assert!(choose_plan(&[], Policy::MinCost).is_err());
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!(Policy::parse("min-cost"), Some(Policy::MinCost));
        assert_eq!(Policy::parse("MAX_QUALITY"), Some(Policy::MaxQuality));
        assert_eq!(Policy::parse("cheapest"), None);
    }

    #[test]
    fn folds_operator_estimates() {
        let mut dd = DataDirectory::in_memory(EngineConfig::default());
        let recs = (0..10)
            .map(|v| DataRecord::new(builtin::number()).with("value", v as i64))
            .collect();
        dd.register_records("nums", builtin::number(), recs).unwrap();
        let plan = PhysicalPlan {
            operators: vec![
                MarshalAndScanDataOp::new(builtin::number(), "nums").into(),
                LimitScanOp::new(builtin::number(), 4).into(),
            ],
            dataset_id: "nums".into(),
        };
        let pc = estimate_plan_cost(&dd, &plan).unwrap();
        assert_eq!(pc.per_op.len(), 2);
        assert_eq!(pc.cardinality, 4.0);
        assert_eq!(pc.quality, 1.0);
        assert_eq!(pc.total_cost, 0.0);
        assert!(pc.total_time >= 0.0);
    }
}
