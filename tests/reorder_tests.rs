//! Legality and completeness of the reordering search.

mod common;

use std::collections::HashSet;

use semflow_core::config::{EngineConfig, ImplicitDependencies};
use semflow_core::schema::{builtin, Field, Schema, SchemaRef};
use semflow_operators::Cardinality;
use semflow_planner::{
    compute_legal_permutations, compute_logical_plan_reorderings, naive_logical_plan, Dataset,
    LogicalOperator,
};

fn schema(name: &str, fields: &[&str]) -> SchemaRef {
    Schema::new(name, name, fields.iter().map(|f| Field::string(*f, *f)).collect()).into_ref()
}

fn filter(cond: &str, on: &SchemaRef, deps: &[&str]) -> LogicalOperator {
    LogicalOperator::FilteredScan {
        input_schema: on.clone(),
        output_schema: on.clone(),
        conditions: vec![cond.to_string()],
        depends_on: Some(deps.iter().map(|d| d.to_string()).collect()),
        target_cache_id: None,
    }
}

fn convert(input: &SchemaRef, output: &SchemaRef, deps: &[&str]) -> LogicalOperator {
    LogicalOperator::ConvertScan {
        input_schema: input.clone(),
        output_schema: output.clone(),
        cardinality: Cardinality::OneToOne,
        depends_on: Some(deps.iter().map(|d| d.to_string()).collect()),
        target_cache_id: None,
    }
}

fn factorial(k: usize) -> usize {
    (1..=k).product()
}

/// No operator sits before an operator generating a field it depends on.
fn respects_dependencies(perm: &[LogicalOperator]) -> bool {
    perm.iter().enumerate().all(|(i, op)| {
        let deps: HashSet<&str> = op
            .depends_on()
            .unwrap_or_default()
            .iter()
            .map(|s| s.as_str())
            .collect();
        perm[i + 1..]
            .iter()
            .all(|later| later.generated_fields().iter().all(|g| !deps.contains(g.as_str())))
    })
}

#[test]
fn independent_filters_yield_k_factorial_orderings() {
    let text = builtin::text_file();
    for k in 1..=5 {
        let run: Vec<_> = (0..k).map(|i| filter(&format!("cond {i}"), &text, &[])).collect();
        let perms = compute_legal_permutations(&run, ImplicitDependencies::AllUpstream);
        assert_eq!(perms.len(), factorial(k), "k = {k}");

        let distinct: HashSet<Vec<String>> = perms
            .iter()
            .map(|p| p.iter().map(|op| op.to_string()).collect())
            .collect();
        assert_eq!(distinct.len(), factorial(k));
    }
}

#[test]
fn dependent_convert_never_precedes_its_generator() {
    let a = schema("A", &["x"]);
    let b = schema("B", &["x", "y"]);
    let c = schema("C", &["x", "y", "z"]);
    let run = vec![convert(&a, &b, &[]), convert(&b, &c, &["y"])];
    for implicit in [ImplicitDependencies::AllUpstream, ImplicitDependencies::None] {
        let perms = compute_legal_permutations(&run, implicit);
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0][0].generated_fields(), vec!["y".to_string()]);
    }
}

#[test]
fn every_generated_ordering_is_legal() {
    let text = builtin::text_file();
    let email = schema("Email", &["filename", "contents", "sender", "subject"]);
    let tagged = schema("Tagged", &["filename", "contents", "sender", "subject", "tag"]);
    let run = vec![
        convert(&text, &email, &[]),
        filter("from a colleague", &email, &["sender"]),
        convert(&email, &tagged, &["sender"]),
        filter("tagged urgent", &tagged, &["tag"]),
        filter("any", &tagged, &[]),
    ];
    let perms = compute_legal_permutations(&run, ImplicitDependencies::None);
    // the convert to Email leads the filter/convert that read `sender`, the
    // Tagged convert leads its filter, and the free filter goes anywhere
    assert_eq!(perms.len(), 15);
    for perm in &perms {
        assert!(respects_dependencies(perm), "illegal ordering: {perm:?}");
    }
}

#[test]
fn fixed_operators_split_runs_and_plans_multiply() {
    let config = EngineConfig::default();
    let ctx = common::memory_dir(config.clone());
    let ds = Dataset::source("mail", builtin::text_file())
        .convert_with(common::email_schema(), Cardinality::OneToOne, None)
        .filter_with(vec!["from a colleague".into()], Some(vec!["sender".into()]))
        .limit(10)
        .filter_with(vec!["mentions lunch".into()], Some(vec![]))
        .filter_with(vec!["mentions friday".into()], Some(vec![]));
    let naive = naive_logical_plan(&ds, &ctx).unwrap();
    let plans = compute_logical_plan_reorderings(&naive, config.implicit_dependencies).unwrap();

    assert_eq!(plans.len(), 2);
    let rendered = |ops: &[LogicalOperator]| ops.iter().map(|o| o.to_string()).collect::<Vec<_>>();
    assert_eq!(rendered(&plans[0].operators), rendered(&naive.operators));
    for plan in &plans {
        plan.validate().unwrap();
        assert_eq!(plan.operators[1].kind_name(), "ConvertScan");
        assert_eq!(plan.operators[3].kind_name(), "LimitScan");
    }
    assert_ne!(plans[0].operators[4], plans[1].operators[4]);
}

#[test]
fn plans_without_reorderable_operators_are_unchanged() {
    let ctx = common::memory_dir(EngineConfig::default());
    let ds = Dataset::source("nums", builtin::number()).limit(3).count();
    let naive = naive_logical_plan(&ds, &ctx).unwrap();
    let plans =
        compute_logical_plan_reorderings(&naive, ImplicitDependencies::AllUpstream).unwrap();
    assert_eq!(plans, vec![naive]);
}
