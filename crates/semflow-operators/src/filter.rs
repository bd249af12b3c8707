//! Filter operator over a solver-synthesized predicate.

use std::time::Instant;

use serde_json::{Map, Value as Json};

use semflow_core::cost::{
    OperatorCostEstimates, NAIVE_EST_FILTER_SELECTIVITY, NAIVE_EST_LLM_QUALITY,
};
use semflow_core::schema::SchemaRef;
use semflow_core::stats::RecordOpStats;
use semflow_io::DataDirectory;
use semflow_solver::{FilterFn, Solver};

use crate::convert::llm_calls_estimate;
use crate::traits::{
    require_input, require_source, schema_config, OpError, PhysicalOperator, RecordStream,
    RecordWithStats,
};

pub struct FilterCandidateOp {
    schema: SchemaRef,
    conditions: Vec<String>,
    filter: FilterFn,
    target_cache_id: Option<String>,
    max_workers: usize,
    should_profile: bool,
}

impl FilterCandidateOp {
    pub fn new(schema: SchemaRef, conditions: Vec<String>, filter: FilterFn) -> Self {
        Self {
            schema,
            conditions,
            filter,
            target_cache_id: None,
            max_workers: 1,
            should_profile: false,
        }
    }

    pub fn synthesize(solver: &Solver, schema: SchemaRef, conditions: Vec<String>) -> Self {
        let filter = solver.synthesize_filter(schema.clone(), conditions.clone());
        Self::new(schema, conditions, filter)
    }

    pub fn with_target_cache_id(mut self, id: Option<String>) -> Self {
        self.target_cache_id = id;
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }

    pub fn with_profiling(mut self, on: bool) -> Self {
        self.should_profile = on;
        self
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }
}

impl PhysicalOperator for FilterCandidateOp {
    fn op_name(&self) -> &'static str {
        "FilterCandidateOp"
    }

    fn input_schema(&self) -> Option<&SchemaRef> {
        Some(&self.schema)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn op_config(&self) -> Map<String, Json> {
        Map::from_iter([
            schema_config("outputSchema", &self.schema),
            schema_config("inputSchema", &self.schema),
            ("filter".into(), Json::from(self.conditions.clone())),
        ])
    }

    fn cost_estimate(
        &self,
        _ctx: &DataDirectory,
        source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        let source = require_source(self.op_name(), source)?;
        if self.conditions.is_empty() {
            return Ok(OperatorCostEstimates::negligible(source.cardinality()));
        }
        let (time, usd, tokens) = llm_calls_estimate(1.0);
        Ok(OperatorCostEstimates::new(
            source.cardinality() * NAIVE_EST_FILTER_SELECTIVITY,
            time,
            usd,
            tokens,
            NAIVE_EST_LLM_QUALITY,
        ))
    }

    fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn should_profile(&self) -> bool {
        self.should_profile
    }

    fn target_cache_id(&self) -> Option<&str> {
        self.target_cache_id.as_deref()
    }

    fn execute<'a>(
        &'a self,
        _ctx: &'a DataDirectory,
        input: Option<RecordStream<'a>>,
    ) -> Result<RecordStream<'a>, OpError> {
        Ok(Box::new(FilterIter {
            op: self,
            op_id: self.identity(None),
            input: require_input(self.op_name(), input)?,
            carried: Carried::default(),
        }))
    }

    fn describe(&self) -> String {
        format!(
            "{}({}, \"{}\")",
            self.op_name(),
            self.schema,
            self.conditions.join(" and ")
        )
    }
}

impl std::fmt::Debug for FilterCandidateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCandidateOp")
            .field("schema", &self.schema.name)
            .field("conditions", &self.conditions)
            .field("target_cache_id", &self.target_cache_id)
            .finish()
    }
}

/// Spend on rejected records, charged to the next record that passes.
#[derive(Debug, Default)]
struct Carried {
    time: f64,
    cost: f64,
    tokens: f64,
}

struct FilterIter<'a> {
    op: &'a FilterCandidateOp,
    op_id: String,
    input: RecordStream<'a>,
    carried: Carried,
}

impl Iterator for FilterIter<'_> {
    type Item = Result<RecordWithStats, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.input.next()? {
                Ok(u) => u.record,
                Err(e) => return Some(Err(e)),
            };
            let start = Instant::now();
            let outcome = match (self.op.filter)(&record) {
                Ok(o) => o,
                Err(e) => return Some(Err(e.into())),
            };
            self.carried.time += start.elapsed().as_secs_f64();
            self.carried.cost += outcome.usage.cost_usd();
            self.carried.tokens += outcome.usage.output_tokens;
            if !outcome.value {
                continue;
            }
            let spent = std::mem::take(&mut self.carried);
            let stats = RecordOpStats::new(
                record.id,
                record.parent_id,
                self.op_id.clone(),
                self.op.op_name(),
                spent.time,
            )
            .with_cost(spent.cost, spent.tokens);
            return Some(Ok(RecordWithStats { record, stats }));
        }
    }
}
