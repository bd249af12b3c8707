//! End-to-end planning: dataset → naive plan → legal reorderings →
//! lowered, costed candidates.

use tracing::info;

use semflow_io::DataDirectory;
use semflow_solver::Solver;

use crate::builder::{naive_logical_plan, Dataset};
use crate::cost::{choose_plan, estimate_plan_cost, PlanCost, Policy};
use crate::error::Result;
use crate::logical::LogicalPlan;
use crate::physical::{generate_physical_plans, LowerOptions, PhysicalPlan};
use crate::reorder::compute_logical_plan_reorderings;

#[derive(Debug)]
pub struct Candidate {
    pub logical: LogicalPlan,
    pub physical: PhysicalPlan,
    pub cost: PlanCost,
}

/// Every legal ordering of `dataset`, lowered and costed, naive order first.
pub fn plan_candidates(
    dataset: &Dataset,
    ctx: &DataDirectory,
    solver: &Solver,
    opts: &LowerOptions,
) -> Result<Vec<Candidate>> {
    let naive = naive_logical_plan(dataset, ctx)?;
    let logical = compute_logical_plan_reorderings(&naive, ctx.config().implicit_dependencies)?;
    let physical = generate_physical_plans(solver, &logical, opts)?;
    let candidates = logical
        .into_iter()
        .zip(physical)
        .map(|(logical, physical)| {
            let cost = estimate_plan_cost(ctx, &physical)?;
            Ok(Candidate {
                logical,
                physical,
                cost,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    info!(
        dataset = dataset.dataset_id(),
        candidates = candidates.len(),
        "planned pipeline"
    );
    Ok(candidates)
}

/// Plan `dataset` and keep the candidate `policy` prefers.
pub fn choose_candidate(
    dataset: &Dataset,
    ctx: &DataDirectory,
    solver: &Solver,
    opts: &LowerOptions,
    policy: Policy,
) -> Result<Candidate> {
    let mut candidates = plan_candidates(dataset, ctx, solver, opts)?;
    let costs: Vec<PlanCost> = candidates.iter().map(|c| c.cost.clone()).collect();
    let best = choose_plan(&costs, policy)?;
    Ok(candidates.swap_remove(best))
}
