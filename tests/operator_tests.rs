//! Operator contracts exercised through scans over registered datasets.

mod common;

use std::sync::Arc;

use semflow_core::aggregate::{AggFunc, GroupBySig};
use semflow_core::config::EngineConfig;
use semflow_core::record::DataRecord;
use semflow_core::schema::{builtin, Field, FieldType, Schema, SchemaRef};
use semflow_core::types::Value;
use semflow_exec::Engine;
use semflow_io::DataDirectory;
use semflow_operators::{
    ApplyAverageAggregateOp, ApplyGroupByOp, Cardinality, InduceFromCandidateOp, LimitScanOp,
    MarshalAndScanDataOp, OpError, PhysicalOp,
};
use semflow_planner::PhysicalPlan;
use semflow_solver::{ConversionStrategy, HardCoded, Services, Solver};

fn sv_schema() -> SchemaRef {
    Schema::new(
        "Reading",
        "A labelled reading",
        vec![
            Field::new("s", FieldType::String, "label", true),
            Field::new("v", FieldType::Numeric, "value", true),
        ],
    )
    .into_ref()
}

fn engine_with(id: &str, schema: SchemaRef, records: Vec<DataRecord>) -> Engine {
    let mut dd = DataDirectory::in_memory(EngineConfig {
        no_cache: true,
        ..EngineConfig::default()
    });
    dd.register_records(id, schema, records).unwrap();
    Engine::new(dd)
}

fn plan(id: &str, operators: Vec<PhysicalOp>) -> PhysicalPlan {
    PhysicalPlan {
        operators,
        dataset_id: id.into(),
    }
}

fn numbers(values: Vec<Value>) -> Vec<DataRecord> {
    values
        .into_iter()
        .map(|v| DataRecord::new(builtin::number()).with("value", v))
        .collect()
}

#[test]
fn identity_is_stable_and_configuration_sensitive() {
    let solver = Solver::new(Services::default());
    let make = |card| {
        InduceFromCandidateOp::synthesize(&solver, builtin::text_file(), builtin::file())
            .with_cardinality(card)
    };
    let a: PhysicalOp = make(Cardinality::OneToOne).into();
    let b: PhysicalOp = make(Cardinality::OneToOne).into();
    let c: PhysicalOp = make(Cardinality::OneToMany).into();

    assert_eq!(a.identity(Some(1)), b.identity(Some(1)));
    assert_eq!(a.identity(None), b.identity(None));
    assert_ne!(a.identity(Some(1)), c.identity(Some(1)));
    assert_ne!(a.identity(Some(1)), a.identity(Some(2)));

    let id = a.identity(Some(1));
    assert!(id.starts_with("InduceFromCandidateOp_1_"));
    assert_eq!(id.rsplit('_').next().map(str::len), Some(6));
    assert!(a.identity(None).starts_with("InduceFromCandidateOp_"));
}

#[test]
fn group_by_counts_in_first_seen_order() {
    let recs = vec![
        DataRecord::new(sv_schema()).with("s", "a").with("v", 1i64),
        DataRecord::new(sv_schema()).with("s", "a").with("v", 2i64),
        DataRecord::new(sv_schema()).with("s", "b").with("v", 3i64),
    ];
    let eng = engine_with("readings", sv_schema(), recs);
    let sig = GroupBySig::new(vec!["s".into()], vec![AggFunc::Count], vec!["s".into()]).unwrap();
    let p = plan(
        "readings",
        vec![
            MarshalAndScanDataOp::new(sv_schema(), "readings").into(),
            ApplyGroupByOp::new(sv_schema(), sig).into(),
        ],
    );
    let out = eng.run(&p).unwrap();
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.records[0].get("s"), Some(&Value::from("a")));
    assert_eq!(out.records[0].get("count(s)"), Some(&Value::Int(2)));
    assert_eq!(out.records[1].get("s"), Some(&Value::from("b")));
    assert_eq!(out.records[1].get("count(s)"), Some(&Value::Int(1)));
    assert_eq!(
        out.records[0].field_names(),
        vec!["s", "count(s)"]
    );
}

#[test]
fn group_by_average_per_group() {
    let recs = vec![
        DataRecord::new(sv_schema()).with("s", "a").with("v", 1i64),
        DataRecord::new(sv_schema()).with("s", "b").with("v", 10i64),
        DataRecord::new(sv_schema()).with("s", "a").with("v", 2i64),
    ];
    let eng = engine_with("readings", sv_schema(), recs);
    let sig = GroupBySig::new(
        vec!["s".into()],
        vec![AggFunc::Average, AggFunc::Count],
        vec!["v".into(), "v".into()],
    )
    .unwrap();
    let p = plan(
        "readings",
        vec![
            MarshalAndScanDataOp::new(sv_schema(), "readings").into(),
            ApplyGroupByOp::new(sv_schema(), sig).into(),
        ],
    );
    let out = eng.run(&p).unwrap();
    assert_eq!(out.records[0].get("average(v)"), Some(&Value::Float(1.5)));
    assert_eq!(out.records[0].get("count(v)"), Some(&Value::Int(2)));
    assert_eq!(out.records[1].get("average(v)"), Some(&Value::Float(10.0)));
}

fn average_of(values: Vec<Value>) -> Result<Value, OpError> {
    let eng = engine_with("nums", builtin::number(), numbers(values));
    let p = plan(
        "nums",
        vec![
            MarshalAndScanDataOp::new(builtin::number(), "nums").into(),
            ApplyAverageAggregateOp::new(builtin::number())?.into(),
        ],
    );
    match eng.run(&p) {
        Ok(out) => {
            assert_eq!(out.records.len(), 1);
            Ok(out.records[0].get("value").cloned().unwrap_or(Value::Null))
        }
        Err(semflow_exec::ExecError::Operator(e)) => Err(e),
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[test]
fn average_skips_values_that_do_not_coerce() {
    let avg = average_of(vec![1i64.into(), 2i64.into(), 3i64.into()]).unwrap();
    assert_eq!(avg, Value::Float(2.0));

    let avg = average_of(vec!["x".into(), 4i64.into(), 6i64.into()]).unwrap();
    assert_eq!(avg, Value::Float(5.0));

    let err = average_of(vec!["x".into(), "y".into()]).unwrap_err();
    assert!(matches!(err, OpError::Arithmetic(_)));
}

#[test]
fn limit_yields_a_prefix_of_min_n_m() {
    for m in [0usize, 1, 4, 9] {
        let values: Vec<Value> = (0..m as i64).map(Value::from).collect();
        let eng = engine_with("nums", builtin::number(), numbers(values));
        let full = eng
            .run(&plan(
                "nums",
                vec![MarshalAndScanDataOp::new(builtin::number(), "nums").into()],
            ))
            .unwrap()
            .records;
        for n in [0usize, 1, 3, 12] {
            let limited = eng
                .run(&plan(
                    "nums",
                    vec![
                        MarshalAndScanDataOp::new(builtin::number(), "nums").into(),
                        LimitScanOp::new(builtin::number(), n).into(),
                    ],
                ))
                .unwrap()
                .records;
            assert_eq!(limited.len(), n.min(m), "n = {n}, m = {m}");
            assert_eq!(&limited[..], &full[..limited.len()]);
        }
    }
}

#[test]
fn solver_prefers_field_copy_then_hard_coded_then_llm() {
    let mut solver = Solver::new(Services::default());
    let text = builtin::text_file();
    let file = builtin::file();

    assert_eq!(
        solver.resolve_conversion(&text, &file),
        ConversionStrategy::HardCoded(HardCoded::FileToText)
    );
    assert_eq!(
        solver.resolve_conversion(&common::email_schema(), &text),
        ConversionStrategy::Llm
    );

    solver.register_simple_conversion(&text, &file);
    assert_eq!(solver.resolve_conversion(&text, &file), ConversionStrategy::FieldCopy);
    let op = InduceFromCandidateOp::synthesize(&solver, text.clone(), file.clone());
    assert_eq!(op.strategy(), ConversionStrategy::FieldCopy);
    assert!(solver.easy_conversion_available(&text, &file));
}

#[test]
fn llm_conversion_without_a_model_fails_before_any_call() {
    let llm = Arc::new(common::ScriptedLlm::default());
    let with_model = common::solver_with(llm.clone());
    let without_model = Solver::new(Services::default());

    let docs = common::text_docs(&[("a.txt", "hi")]);
    let eng = engine_with("docs", builtin::text_file(), docs);
    let make = |solver: &Solver| {
        plan(
            "docs",
            vec![
                MarshalAndScanDataOp::new(builtin::text_file(), "docs").into(),
                InduceFromCandidateOp::synthesize(solver, common::email_schema(), builtin::text_file())
                    .into(),
            ],
        )
    };

    let err = eng.run(&make(&without_model)).unwrap_err();
    assert!(err.to_string().contains("no LLM service"), "{err}");
    assert_eq!(llm.calls(), 0);

    let out = eng.run(&make(&with_model)).unwrap();
    assert_eq!(out.records.len(), 1);
    assert_eq!(llm.calls(), common::email_schema().fields.len());
}
