//! Runtime: pull a `PhysicalPlan` to completion and emit a `RunManifest`.
//!
//! - Operators are chained source-first; each consumes the previous stream.
//! - Every operator's output is tapped for time/cost/token totals.
//! - Operators with `should_profile` also keep each record's stats.
//! - A failing record aborts the run; open cache targets stay unpublished.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use semflow_core::manifest::RunManifest;
use semflow_core::record::DataRecord;
use semflow_core::stats::RecordOpStats;
use semflow_io::DataDirectory;
use semflow_operators::{OpError, RecordStream, RecordWithStats};
use semflow_planner::PhysicalPlan;

use crate::metrics::emit_span;
use crate::replay::{hash_outputs, hash_plan};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("operator exec: {0}")]
    Operator(#[from] OpError),
    #[error("invalid plan: {0}")]
    Invalid(String),
    #[error("hashing error: {0}")]
    Hash(String),
}

/// Totals for one operator over a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperatorProfile {
    pub op_id: String,
    pub op_name: String,
    pub records_out: u64,
    pub total_time: f64,
    pub total_cost: f64,
    pub total_output_tokens: f64,
    /// Present only for operators built with profiling on.
    pub record_stats: Option<Vec<RecordOpStats>>,
}

impl OperatorProfile {
    fn observe(&mut self, stats: &RecordOpStats) {
        self.records_out += 1;
        self.total_time += stats.op_time;
        self.total_cost += stats.op_cost;
        self.total_output_tokens += stats.output_tokens;
        if let Some(all) = self.record_stats.as_mut() {
            all.push(stats.clone());
        }
    }
}

#[derive(Debug)]
pub struct RunOutput {
    pub records: Vec<DataRecord>,
    /// Source first, in plan order.
    pub profiles: Vec<OperatorProfile>,
    pub manifest: RunManifest,
    pub output_digest: String,
}

impl RunOutput {
    pub fn total_cost(&self) -> f64 {
        self.profiles.iter().map(|p| p.total_cost).sum()
    }

    pub fn total_time(&self) -> f64 {
        self.profiles.iter().map(|p| p.total_time).sum()
    }
}

type Profiles = Rc<RefCell<Vec<OperatorProfile>>>;

/// Pass-through that records every emitted stat into its operator's slot.
struct ProfileTap<'a> {
    inner: RecordStream<'a>,
    profiles: Profiles,
    slot: usize,
}

impl<'a> Iterator for ProfileTap<'a> {
    type Item = Result<RecordWithStats, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        if let Ok(rws) = &item {
            if let Some(profile) = self.profiles.borrow_mut().get_mut(self.slot) {
                profile.observe(&rws.stats);
            }
        }
        Some(item)
    }
}

/// Engine owns the per-run context: config, datasets, caches.
pub struct Engine {
    ctx: DataDirectory,
}

impl Engine {
    pub fn new(ctx: DataDirectory) -> Self {
        Self { ctx }
    }

    pub fn into_ctx(self) -> DataDirectory {
        self.ctx
    }

    fn check_shape(plan: &PhysicalPlan) -> Result<(), ExecError> {
        let first = plan
            .operators
            .first()
            .ok_or_else(|| ExecError::Invalid("empty physical plan".into()))?;
        if !first.is_source() {
            return Err(ExecError::Invalid(format!(
                "plan starts with {} instead of a source",
                first.op_name()
            )));
        }
        if let Some(pos) = plan.operators.iter().skip(1).position(|op| op.is_source()) {
            return Err(ExecError::Invalid(format!(
                "source operator at position {}",
                pos + 1
            )));
        }
        Ok(())
    }

    fn build_stream<'a>(
        &'a self,
        plan: &'a PhysicalPlan,
        profiles: &Profiles,
    ) -> Result<RecordStream<'a>, ExecError> {
        Self::check_shape(plan)?;
        let mut stream: Option<RecordStream<'a>> = None;
        for (pos, op) in plan.operators.iter().enumerate() {
            let op_id = op.identity(Some(pos));
            emit_span(
                "operator_bound",
                &[("op_id", op_id.clone()), ("profile", op.should_profile().to_string())],
            );
            let slot = {
                let mut all = profiles.borrow_mut();
                all.push(OperatorProfile {
                    op_id,
                    op_name: op.op_name().to_string(),
                    record_stats: op.should_profile().then(Vec::new),
                    ..OperatorProfile::default()
                });
                all.len() - 1
            };
            let out = op.execute(&self.ctx, stream.take())?;
            stream = Some(Box::new(ProfileTap {
                inner: out,
                profiles: profiles.clone(),
                slot,
            }));
        }
        stream.ok_or_else(|| ExecError::Invalid("empty physical plan".into()))
    }

    /// Lazy output of `plan`; nothing runs until the stream is pulled.
    pub fn stream<'a>(&'a self, plan: &'a PhysicalPlan) -> Result<RecordStream<'a>, ExecError> {
        self.build_stream(plan, &Rc::new(RefCell::new(Vec::new())))
    }

    /// Execute `plan` to completion.
    pub fn run(&self, plan: &PhysicalPlan) -> Result<RunOutput, ExecError> {
        let plan_hash = hash_plan(plan)?;
        let manifest = RunManifest::new(plan_hash, plan.dataset_id.clone(), now_millis());
        let profiles: Profiles = Rc::new(RefCell::new(Vec::new()));

        let mut records = Vec::new();
        {
            let stream = self.build_stream(plan, &profiles)?;
            for item in stream {
                match item {
                    Ok(rws) => records.push(rws.record),
                    Err(e) => {
                        warn!(error = %e, dataset = %plan.dataset_id, "run aborted");
                        return Err(e.into());
                    }
                }
            }
        }

        let profiles = profiles.take();
        let total_cost: f64 = profiles.iter().map(|p| p.total_cost).sum();
        for p in &profiles {
            emit_span(
                "operator_done",
                &[
                    ("op_id", p.op_id.clone()),
                    ("records_out", p.records_out.to_string()),
                    ("time_s", format!("{:.4}", p.total_time)),
                    ("cost_usd", format!("{:.6}", p.total_cost)),
                ],
            );
        }
        let manifest = manifest.finish(now_millis(), records.len() as u64, total_cost);
        info!(
            plan_hash = %manifest.plan_hash.to_hex(),
            records = records.len(),
            cost_usd = total_cost,
            "run finished"
        );
        Ok(RunOutput {
            output_digest: hash_outputs(&records).to_hex(),
            records,
            profiles,
            manifest,
        })
    }
}

// --- helpers ---

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use semflow_core::aggregate::{AggFunc, GroupBySig};
    use semflow_core::config::EngineConfig;
    use semflow_core::schema::builtin;
    use semflow_core::types::Value;
    use semflow_operators::{ApplyGroupByOp, LimitScanOp, MarshalAndScanDataOp};

    fn engine() -> Engine {
        let mut dd = DataDirectory::in_memory(EngineConfig::default());
        let recs = (1..=5)
            .map(|v| DataRecord::new(builtin::number()).with("value", v as i64))
            .collect();
        dd.register_records("nums", builtin::number(), recs).unwrap();
        Engine::new(dd)
    }

    #[test]
    fn runs_scan_then_limit_with_profiles() {
        let eng = engine();
        let plan = PhysicalPlan {
            operators: vec![
                MarshalAndScanDataOp::new(builtin::number(), "nums")
                    .with_profiling(true)
                    .into(),
                LimitScanOp::new(builtin::number(), 2).into(),
            ],
            dataset_id: "nums".into(),
        };
        let out = eng.run(&plan).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].get("value"), Some(&Value::Int(1)));
        assert_eq!(out.manifest.records_out, 2);
        assert_eq!(out.manifest.dataset_id, "nums");
        assert_eq!(out.profiles.len(), 2);
        // limit stops pulling, so the scan only emitted what was needed
        assert_eq!(out.profiles[0].records_out, 2);
        assert_eq!(out.profiles[0].record_stats.as_ref().map(|s| s.len()), Some(2));
        assert!(out.profiles[1].record_stats.is_none());
    }

    #[test]
    fn plan_hash_and_digest_are_reproducible() {
        let eng = engine();
        let plan = PhysicalPlan {
            operators: vec![MarshalAndScanDataOp::new(builtin::number(), "nums").into()],
            dataset_id: "nums".into(),
        };
        let a = eng.run(&plan).unwrap();
        let b = eng.run(&plan).unwrap();
        assert_eq!(a.manifest.plan_hash, b.manifest.plan_hash);
        assert_eq!(a.output_digest, b.output_digest);
        assert_ne!(a.manifest.id, b.manifest.id);
    }

    #[test]
    fn malformed_plans_are_rejected() {
        let eng = engine();
        let empty = PhysicalPlan {
            operators: vec![],
            dataset_id: "nums".into(),
        };
        assert!(matches!(eng.run(&empty), Err(ExecError::Invalid(_))));
        let headless = PhysicalPlan {
            operators: vec![LimitScanOp::new(builtin::number(), 1).into()],
            dataset_id: "nums".into(),
        };
        assert!(matches!(eng.run(&headless), Err(ExecError::Invalid(_))));
    }

    #[test]
    fn group_by_missing_field_aborts_the_run() {
        let eng = engine();
        let sig = GroupBySig::new(vec!["sender".into()], vec![AggFunc::Count], vec!["sender".into()])
            .unwrap();
        let plan = PhysicalPlan {
            operators: vec![
                MarshalAndScanDataOp::new(builtin::number(), "nums").into(),
                ApplyGroupByOp::new(builtin::number(), sig).into(),
            ],
            dataset_id: "nums".into(),
        };
        assert!(matches!(
            eng.run(&plan),
            Err(ExecError::Operator(OpError::MissingField { .. }))
        ));
    }

    #[test]
    fn stream_is_lazy() {
        let eng = engine();
        let plan = PhysicalPlan {
            operators: vec![MarshalAndScanDataOp::new(builtin::number(), "nums").into()],
            dataset_id: "nums".into(),
        };
        let mut s = eng.stream(&plan).unwrap();
        assert!(s.next().unwrap().is_ok());
    }
}
