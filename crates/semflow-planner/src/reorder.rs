//! Dependency-legal reorderings of filter/convert runs.
//!
//! A run is a maximal contiguous stretch of filters and converts. Scans,
//! group-bys, aggregates and limits stay where they are. Each run is
//! expanded into every legal permutation, and the plan set is the cross
//! product of all runs.
//!
//! Legality: no operator may sit after an upstream operator that depends on
//! a field it generates. Filters generate nothing, so they never violate the
//! rule as the later operator; they can still be pinned behind a convert
//! they depend on.

use std::collections::HashSet;

use tracing::debug;

use semflow_core::config::ImplicitDependencies;
use semflow_core::schema::SchemaRef;

use crate::error::{PlanError, Result};
use crate::logical::{LogicalOperator, LogicalPlan};

/// Fill in `depends_on` for operators that left it unset.
///
/// `AllUpstream`: every field generated by a convert earlier in the run.
/// `None`: nothing.
fn resolve_dependencies(
    run: &[LogicalOperator],
    implicit: ImplicitDependencies,
) -> Vec<LogicalOperator> {
    let mut upstream_generated: Vec<String> = Vec::new();
    let mut out = Vec::with_capacity(run.len());
    for op in run {
        let resolved = match op.depends_on() {
            Some(_) => op.clone(),
            None => {
                let deps = match implicit {
                    ImplicitDependencies::AllUpstream => upstream_generated.clone(),
                    ImplicitDependencies::None => Vec::new(),
                };
                op.clone().with_depends_on(deps)
            }
        };
        upstream_generated.extend(op.generated_fields());
        out.push(resolved);
    }
    out
}

fn is_legal(perm: &[&LogicalOperator]) -> bool {
    for (idx, op) in perm.iter().enumerate() {
        if !op.is_convert() {
            continue;
        }
        let generated: HashSet<String> = op.generated_fields().into_iter().collect();
        if generated.is_empty() {
            continue;
        }
        let conflict = perm[..idx].iter().any(|upstream| {
            upstream
                .depends_on()
                .unwrap_or_default()
                .iter()
                .any(|col| generated.contains(col))
        });
        if conflict {
            return false;
        }
    }
    true
}

/// Next index permutation in lexicographic order; false after the last.
fn next_permutation(idx: &mut [usize]) -> bool {
    if idx.len() < 2 {
        return false;
    }
    let mut i = idx.len() - 1;
    while i > 0 && idx[i - 1] >= idx[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = idx.len() - 1;
    while idx[j] <= idx[i - 1] {
        j -= 1;
    }
    idx.swap(i - 1, j);
    idx[i..].reverse();
    true
}

/// Index permutations of `run` (after dependency resolution) that are legal,
/// identity first.
fn legal_index_permutations(resolved: &[LogicalOperator]) -> Vec<Vec<usize>> {
    let mut idx: Vec<usize> = (0..resolved.len()).collect();
    let mut out = Vec::new();
    loop {
        let perm: Vec<&LogicalOperator> = idx.iter().map(|&i| &resolved[i]).collect();
        if is_legal(&perm) {
            out.push(idx.clone());
        }
        if !next_permutation(&mut idx) {
            break;
        }
    }
    out
}

/// Every legal ordering of a filter/convert run, identity first.
pub fn compute_legal_permutations(
    run: &[LogicalOperator],
    implicit: ImplicitDependencies,
) -> Vec<Vec<LogicalOperator>> {
    let resolved = resolve_dependencies(run, implicit);
    legal_index_permutations(&resolved)
        .into_iter()
        .map(|p| p.into_iter().map(|i| resolved[i].clone()).collect())
        .collect()
}

/// Output schema after the first `n` operators of an ordering, if any of
/// them is a convert.
fn last_convert_output<'a>(ops: impl Iterator<Item = &'a LogicalOperator>) -> Option<SchemaRef> {
    ops.filter(|op| op.is_convert())
        .last()
        .map(|op| op.output_schema().clone())
}

/// Re-key cache targets for a permuted run.
///
/// Position `i` produces the same records as position `i` of the naive run
/// only when both prefixes hold the same operators and end in the same
/// schema; then it inherits the naive target. Otherwise it gets none.
fn assign_cache_targets(resolved: &[LogicalOperator], perm: &[usize]) -> Vec<LogicalOperator> {
    let mut running_max = 0usize;
    perm.iter()
        .enumerate()
        .map(|(pos, &orig)| {
            running_max = running_max.max(orig);
            let same_set = running_max == pos;
            let same_schema = last_convert_output(perm[..=pos].iter().map(|&i| &resolved[i]))
                == last_convert_output(resolved[..=pos].iter());
            let target = if same_set && same_schema {
                resolved[pos].target_cache_id().map(str::to_string)
            } else {
                None
            };
            resolved[orig].clone().with_target_cache_id(target)
        })
        .collect()
}

/// Expand a naive plan into every equivalent plan with its filter/convert
/// runs reordered. Duplicates are kept.
pub fn compute_logical_plan_reorderings(
    plan: &LogicalPlan,
    implicit: ImplicitDependencies,
) -> Result<Vec<LogicalPlan>> {
    let ops = &plan.operators;
    let mut all_plans: Vec<LogicalPlan> = Vec::new();
    let mut idx = 0;

    while idx < ops.len() {
        let op = &ops[idx];

        if all_plans.is_empty() {
            if !op.is_scan() {
                return Err(PlanError::Contract(format!(
                    "plan must start with a scan, found {}",
                    op.kind_name()
                )));
            }
            all_plans.push(LogicalPlan::new(vec![op.clone()], plan.dataset_id.clone()));
            idx += 1;
        } else if op.is_scan() {
            return Err(PlanError::Contract(format!(
                "unsupported plan structure: {} at position {idx}",
                op.kind_name()
            )));
        } else if !op.is_reorderable() {
            all_plans = all_plans
                .iter()
                .map(|sub| LogicalPlan::from_ops_and_subplan(vec![op.clone()], sub))
                .collect();
            idx += 1;
        } else {
            let run_len = ops[idx..].iter().take_while(|o| o.is_reorderable()).count();
            let run = &ops[idx..idx + run_len];
            let resolved = resolve_dependencies(run, implicit);
            let perms = legal_index_permutations(&resolved);
            debug!(
                start = idx,
                run_len,
                legal = perms.len(),
                "computed legal permutations"
            );
            if perms.is_empty() {
                return Err(PlanError::Contract(format!(
                    "no legal ordering of the operators at positions {idx}..{}",
                    idx + run_len
                )));
            }

            let mut plans = Vec::with_capacity(perms.len() * all_plans.len());
            for perm in &perms {
                let ordered = assign_cache_targets(&resolved, perm);
                for sub in &all_plans {
                    plans.push(LogicalPlan::from_ops_and_subplan(ordered.clone(), sub));
                }
            }
            all_plans = plans;
            idx += run_len;
        }
    }

    if all_plans.is_empty() {
        return Err(PlanError::Contract("empty logical plan".into()));
    }
    debug!(plans = all_plans.len(), "logical reorderings");
    Ok(all_plans)
}
