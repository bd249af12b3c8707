//! Conversion operator: applies a solver-synthesized function to every
//! upstream record, dropping records the function declines to convert.

use std::time::Instant;

use serde_json::{Map, Value as Json};
use tracing::trace;

use semflow_core::cost::{
    OperatorCostEstimates, NAIVE_EST_HARDCODED_SECONDS, NAIVE_EST_LLM_CALL_SECONDS,
    NAIVE_EST_LLM_QUALITY, NAIVE_EST_ONE_TO_MANY_SELECTIVITY, NAIVE_EST_OUTPUT_TOKENS,
    NAIVE_EST_RECORD_KB, NAIVE_EST_TOKENS_PER_KB, NAIVE_EST_USD_PER_INPUT_TOKEN,
    NAIVE_EST_USD_PER_OUTPUT_TOKEN,
};
use semflow_core::schema::SchemaRef;
use semflow_core::stats::RecordOpStats;
use semflow_io::DataDirectory;
use semflow_solver::{ConversionStrategy, ConvertFn, HardCoded, Solver};

use crate::traits::{
    require_input, require_source, schema_config, OpError, PhysicalOperator, RecordStream,
    RecordWithStats,
};

/// How many outputs a convert is expected to produce per input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    #[default]
    OneToOne,
    OneToMany,
}

impl Cardinality {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "one_to_one" | "1:1" => Some(Self::OneToOne),
            "one_to_many" | "1:n" => Some(Self::OneToMany),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "one_to_one",
            Cardinality::OneToMany => "one_to_many",
        }
    }
}

/// Per-record (time, usd, output tokens) for `calls` LLM invocations.
pub(crate) fn llm_calls_estimate(calls: f64) -> (f64, f64, f64) {
    let input_tokens = NAIVE_EST_TOKENS_PER_KB * NAIVE_EST_RECORD_KB;
    let per_call_usd = input_tokens * NAIVE_EST_USD_PER_INPUT_TOKEN
        + NAIVE_EST_OUTPUT_TOKENS * NAIVE_EST_USD_PER_OUTPUT_TOKEN;
    (
        calls * NAIVE_EST_LLM_CALL_SECONDS,
        calls * per_call_usd,
        calls * NAIVE_EST_OUTPUT_TOKENS,
    )
}

pub struct InduceFromCandidateOp {
    output_schema: SchemaRef,
    input_schema: SchemaRef,
    strategy: ConversionStrategy,
    convert: ConvertFn,
    cardinality: Cardinality,
    target_cache_id: Option<String>,
    max_workers: usize,
    should_profile: bool,
}

impl InduceFromCandidateOp {
    pub fn new(
        output_schema: SchemaRef,
        input_schema: SchemaRef,
        strategy: ConversionStrategy,
        convert: ConvertFn,
    ) -> Self {
        Self {
            output_schema,
            input_schema,
            strategy,
            convert,
            cardinality: Cardinality::OneToOne,
            target_cache_id: None,
            max_workers: 1,
            should_profile: false,
        }
    }

    /// Resolve the conversion through `solver` and wrap the result.
    pub fn synthesize(solver: &Solver, output_schema: SchemaRef, input_schema: SchemaRef) -> Self {
        let strategy = solver.resolve_conversion(&output_schema, &input_schema);
        let convert = solver.synthesize_convert(output_schema.clone(), input_schema.clone());
        Self::new(output_schema, input_schema, strategy, convert)
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
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

    pub fn strategy(&self) -> ConversionStrategy {
        self.strategy
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }
}

impl PhysicalOperator for InduceFromCandidateOp {
    fn op_name(&self) -> &'static str {
        "InduceFromCandidateOp"
    }

    fn input_schema(&self) -> Option<&SchemaRef> {
        Some(&self.input_schema)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.output_schema
    }

    fn op_config(&self) -> Map<String, Json> {
        Map::from_iter([
            schema_config("outputSchema", &self.output_schema),
            schema_config("inputSchema", &self.input_schema),
            ("strategy".into(), Json::from(self.strategy.as_str())),
            ("cardinality".into(), Json::from(self.cardinality.as_str())),
        ])
    }

    fn cost_estimate(
        &self,
        _ctx: &DataDirectory,
        source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        let source = require_source(self.op_name(), source)?;
        let mut cardinality = source.cardinality();
        if self.cardinality == Cardinality::OneToMany {
            cardinality *= NAIVE_EST_ONE_TO_MANY_SELECTIVITY;
        }
        Ok(match self.strategy {
            ConversionStrategy::FieldCopy => OperatorCostEstimates::negligible(cardinality),
            ConversionStrategy::HardCoded(HardCoded::FileToImage) => {
                let (time, usd, tokens) = llm_calls_estimate(1.0);
                OperatorCostEstimates::new(cardinality, time, usd, tokens, NAIVE_EST_LLM_QUALITY)
            }
            ConversionStrategy::HardCoded(_) => OperatorCostEstimates::new(
                cardinality,
                NAIVE_EST_HARDCODED_SECONDS,
                0.0,
                0.0,
                1.0,
            ),
            ConversionStrategy::Llm => {
                let calls = self.output_schema.fields.len() as f64;
                let (time, usd, tokens) = llm_calls_estimate(calls);
                OperatorCostEstimates::new(cardinality, time, usd, tokens, NAIVE_EST_LLM_QUALITY)
            }
        })
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
        let input = require_input(self.op_name(), input)?;
        let op_id = self.identity(None);
        Ok(Box::new(input.filter_map(move |item| {
            let upstream = match item {
                Ok(u) => u.record,
                Err(e) => return Some(Err(e)),
            };
            let start = Instant::now();
            let outcome = match (self.convert)(&upstream) {
                Ok(o) => o,
                Err(e) => return Some(Err(e.into())),
            };
            let op_time = start.elapsed().as_secs_f64();
            let Some(record) = outcome.value else {
                trace!(record = %upstream.id, "conversion produced no record");
                return None;
            };
            let stats = RecordOpStats::new(
                record.id,
                record.parent_id,
                op_id.clone(),
                self.op_name(),
                op_time,
            )
            .with_cost(outcome.usage.cost_usd(), outcome.usage.output_tokens);
            Some(Ok(RecordWithStats { record, stats }))
        })))
    }

    fn describe(&self) -> String {
        format!(
            "{}({} -> {}, {})",
            self.op_name(),
            self.input_schema,
            self.output_schema,
            self.strategy.as_str()
        )
    }
}

impl std::fmt::Debug for InduceFromCandidateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InduceFromCandidateOp")
            .field("output_schema", &self.output_schema.name)
            .field("input_schema", &self.input_schema.name)
            .field("strategy", &self.strategy)
            .field("cardinality", &self.cardinality)
            .field("target_cache_id", &self.target_cache_id)
            .finish()
    }
}
