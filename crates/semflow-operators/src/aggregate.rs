//! Blocking operators: group-by and whole-stream aggregates.
//!
//! All of them drain the upstream stream on the first pull, then emit from
//! owned state. Nothing is produced before the drain completes.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::{Map, Value as Json};
use tracing::debug;

use semflow_core::aggregate::{AggFunc, GroupBySig};
use semflow_core::cost::{OperatorCostEstimates, NAIVE_EST_NUM_GROUPS};
use semflow_core::hash::canonical_json;
use semflow_core::record::DataRecord;
use semflow_core::schema::{builtin, SchemaRef};
use semflow_core::stats::RecordOpStats;
use semflow_core::types::Value;
use semflow_io::DataDirectory;
use semflow_solver::{AggregateFn, Solver};

use crate::traits::{
    require_input, require_source, schema_config, OpError, PhysicalOperator, RecordStream,
    RecordWithStats,
};

// ---------------- group-by ----------------

#[derive(Debug, Clone, PartialEq)]
enum AggState {
    Count(i64),
    Average { sum: f64, count: i64 },
}

impl AggState {
    fn init(func: AggFunc) -> Self {
        match func {
            AggFunc::Count => AggState::Count(0),
            AggFunc::Average => AggState::Average { sum: 0.0, count: 0 },
        }
    }

    fn finalize(&self) -> Value {
        match self {
            AggState::Count(n) => Value::Int(*n),
            AggState::Average { count: 0, .. } => Value::Null,
            AggState::Average { sum, count } => Value::Float(sum / *count as f64),
        }
    }
}

#[derive(Debug)]
struct Group {
    key: Vec<Value>,
    states: Vec<AggState>,
}

/// Insertion-ordered map from group key to per-aggregate running state.
#[derive(Debug)]
struct GroupByAccumulator<'s> {
    sig: &'s GroupBySig,
    groups: Vec<Group>,
    index: HashMap<String, usize>,
}

impl<'s> GroupByAccumulator<'s> {
    fn new(sig: &'s GroupBySig) -> Self {
        Self {
            sig,
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn update(&mut self, record: &DataRecord) -> Result<(), OpError> {
        let mut key = Vec::with_capacity(self.sig.group_by_fields().len());
        for field in self.sig.group_by_fields() {
            key.push(field_value(record, field)?.clone());
        }
        let key_str = canonical_json(&Json::Array(key.iter().map(|v| v.to_json(false)).collect()));

        let idx = match self.index.get(&key_str) {
            Some(i) => *i,
            None => {
                let states = self.sig.agg_funcs().iter().map(|f| AggState::init(*f)).collect();
                self.groups.push(Group { key, states });
                self.index.insert(key_str, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };

        let group = &mut self.groups[idx];
        for (state, (_, target)) in group.states.iter_mut().zip(self.sig.aggregates()) {
            let value = field_value(record, target)?;
            match state {
                AggState::Count(n) => *n += 1,
                AggState::Average { sum, count } => {
                    let v = value.coerce_f64().ok_or_else(|| {
                        OpError::Exec(format!(
                            "group-by average over non-numeric value in field '{target}'"
                        ))
                    })?;
                    *sum += v;
                    *count += 1;
                }
            }
        }
        Ok(())
    }

    fn into_records(self, schema: &SchemaRef) -> Vec<DataRecord> {
        let sig = self.sig;
        self.groups
            .into_iter()
            .map(|g| {
                let mut dr = DataRecord::new(schema.clone());
                for (name, value) in sig.group_by_fields().iter().zip(g.key) {
                    dr.set(name.clone(), value);
                }
                for (state, (func, target)) in g.states.iter().zip(sig.aggregates()) {
                    dr.set(func.output_field(target), state.finalize());
                }
                dr
            })
            .collect()
    }
}

fn field_value<'r>(record: &'r DataRecord, field: &str) -> Result<&'r Value, OpError> {
    record.get(field).ok_or_else(|| OpError::MissingField {
        op: "ApplyGroupByOp",
        field: field.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyGroupByOp {
    input_schema: SchemaRef,
    output_schema: SchemaRef,
    gby_sig: GroupBySig,
    target_cache_id: Option<String>,
    should_profile: bool,
}

impl ApplyGroupByOp {
    pub fn new(input_schema: SchemaRef, gby_sig: GroupBySig) -> Self {
        let output_schema = gby_sig.output_schema(&input_schema);
        Self {
            input_schema,
            output_schema,
            gby_sig,
            target_cache_id: None,
            should_profile: false,
        }
    }

    pub fn with_target_cache_id(mut self, id: Option<String>) -> Self {
        self.target_cache_id = id;
        self
    }

    pub fn with_profiling(mut self, on: bool) -> Self {
        self.should_profile = on;
        self
    }

    pub fn gby_sig(&self) -> &GroupBySig {
        &self.gby_sig
    }

    /// Drain `input`, then return one record per first-seen group key.
    fn drain(&self, input: RecordStream<'_>) -> Result<Vec<DataRecord>, OpError> {
        let mut acc = GroupByAccumulator::new(&self.gby_sig);
        for item in input {
            acc.update(&item?.record)?;
        }
        debug!(groups = acc.groups.len(), "group-by drained");
        Ok(acc.into_records(&self.output_schema))
    }
}

impl PhysicalOperator for ApplyGroupByOp {
    fn op_name(&self) -> &'static str {
        "ApplyGroupByOp"
    }

    fn input_schema(&self) -> Option<&SchemaRef> {
        Some(&self.input_schema)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.output_schema
    }

    fn op_config(&self) -> Map<String, Json> {
        let aggregates: Vec<Json> = self
            .gby_sig
            .aggregates()
            .map(|(func, field)| Json::from(func.output_field(field)))
            .collect();
        let sig = Json::from(Map::from_iter([
            ("groupByFields".to_string(), Json::from(self.gby_sig.group_by_fields().to_vec())),
            ("aggregates".to_string(), Json::from(aggregates)),
        ]));
        Map::from_iter([
            schema_config("inputSchema", &self.input_schema),
            ("gbySig".into(), sig),
        ])
    }

    fn cost_estimate(
        &self,
        _ctx: &DataDirectory,
        source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        let source = require_source(self.op_name(), source)?;
        Ok(OperatorCostEstimates::negligible(
            NAIVE_EST_NUM_GROUPS.min(source.cardinality().max(1.0)),
        ))
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
        Ok(blocking_stream(input, move |input| {
            let start = Instant::now();
            let records = self.drain(input)?;
            let per_record = start.elapsed().as_secs_f64() / records.len().max(1) as f64;
            Ok(records
                .into_iter()
                .map(|record| {
                    let stats =
                        RecordOpStats::new(record.id, None, op_id.clone(), self.op_name(), per_record);
                    RecordWithStats { record, stats }
                })
                .collect())
        }))
    }

    fn describe(&self) -> String {
        let aggs: Vec<String> = self
            .gby_sig
            .aggregates()
            .map(|(f, t)| f.output_field(t))
            .collect();
        format!(
            "{}(by [{}], {})",
            self.op_name(),
            self.gby_sig.group_by_fields().join(", "),
            aggs.join(", ")
        )
    }
}

/// Defers `drain` to the first pull, then yields its output.
fn blocking_stream<'a, F>(input: RecordStream<'a>, drain: F) -> RecordStream<'a>
where
    F: FnOnce(RecordStream<'a>) -> Result<Vec<RecordWithStats>, OpError> + 'a,
{
    let mut pending = Some((input, drain));
    let mut ready: std::vec::IntoIter<RecordWithStats> = Vec::new().into_iter();
    Box::new(std::iter::from_fn(move || {
        if let Some((input, drain)) = pending.take() {
            match drain(input) {
                Ok(out) => ready = out.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
        ready.next().map(Ok)
    }))
}

// ---------------- whole-stream aggregates ----------------

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyCountAggregateOp {
    input_schema: SchemaRef,
    output_schema: SchemaRef,
    agg: AggregateFn,
    target_cache_id: Option<String>,
    should_profile: bool,
}

impl ApplyCountAggregateOp {
    pub fn new(input_schema: SchemaRef, agg: AggregateFn) -> Self {
        Self {
            input_schema,
            output_schema: builtin::number(),
            agg,
            target_cache_id: None,
            should_profile: false,
        }
    }

    pub fn synthesize(solver: &Solver, input_schema: SchemaRef) -> Result<Self, OpError> {
        Ok(Self::new(input_schema, solver.synthesize_aggregate(AggFunc::Count)?))
    }

    pub fn with_target_cache_id(mut self, id: Option<String>) -> Self {
        self.target_cache_id = id;
        self
    }

    pub fn with_profiling(mut self, on: bool) -> Self {
        self.should_profile = on;
        self
    }
}

impl PhysicalOperator for ApplyCountAggregateOp {
    fn op_name(&self) -> &'static str {
        "ApplyCountAggregateOp"
    }

    fn input_schema(&self) -> Option<&SchemaRef> {
        Some(&self.input_schema)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.output_schema
    }

    fn op_config(&self) -> Map<String, Json> {
        Map::from_iter([
            schema_config("inputSchema", &self.input_schema),
            ("aggFunction".into(), Json::from(AggFunc::Count.as_str())),
        ])
    }

    fn cost_estimate(
        &self,
        _ctx: &DataDirectory,
        source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        require_source(self.op_name(), source)?;
        Ok(OperatorCostEstimates::negligible(1.0))
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
        Ok(blocking_stream(input, move |input| {
            let start = Instant::now();
            let mut state = self.agg.init();
            let mut last = None;
            for item in input {
                let record = item?.record;
                state = self.agg.merge(state, &record);
                last = Some(record.id);
            }
            let record = self.agg.finalize(state).with_parent(last);
            let stats = RecordOpStats::new(
                record.id,
                record.parent_id,
                op_id,
                self.op_name(),
                start.elapsed().as_secs_f64(),
            );
            Ok(vec![RecordWithStats { record, stats }])
        }))
    }
}

/// Mean of the `value` field over every record whose value coerces to a
/// number. Zero coercible records is an arithmetic error.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyAverageAggregateOp {
    input_schema: SchemaRef,
    output_schema: SchemaRef,
    target_cache_id: Option<String>,
    should_profile: bool,
}

const AVERAGE_FIELD: &str = "value";

impl ApplyAverageAggregateOp {
    pub fn new(input_schema: SchemaRef) -> Result<Self, OpError> {
        if !input_schema.has_field(AVERAGE_FIELD) {
            return Err(OpError::Schema(format!(
                "average aggregate needs a '{AVERAGE_FIELD}' field, {} has none",
                input_schema
            )));
        }
        Ok(Self {
            input_schema,
            output_schema: builtin::number(),
            target_cache_id: None,
            should_profile: false,
        })
    }

    pub fn with_target_cache_id(mut self, id: Option<String>) -> Self {
        self.target_cache_id = id;
        self
    }

    pub fn with_profiling(mut self, on: bool) -> Self {
        self.should_profile = on;
        self
    }
}

impl PhysicalOperator for ApplyAverageAggregateOp {
    fn op_name(&self) -> &'static str {
        "ApplyAverageAggregateOp"
    }

    fn input_schema(&self) -> Option<&SchemaRef> {
        Some(&self.input_schema)
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.output_schema
    }

    fn op_config(&self) -> Map<String, Json> {
        Map::from_iter([
            schema_config("inputSchema", &self.input_schema),
            ("aggFunction".into(), Json::from(AggFunc::Average.as_str())),
        ])
    }

    fn cost_estimate(
        &self,
        _ctx: &DataDirectory,
        source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        require_source(self.op_name(), source)?;
        Ok(OperatorCostEstimates::negligible(1.0))
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
        Ok(blocking_stream(input, move |input| {
            let start = Instant::now();
            let (mut sum, mut count) = (0.0f64, 0u64);
            let mut last = None;
            for item in input {
                let record = item?.record;
                let value = record.get(AVERAGE_FIELD).ok_or_else(|| OpError::MissingField {
                    op: "ApplyAverageAggregateOp",
                    field: AVERAGE_FIELD.to_string(),
                })?;
                if let Some(v) = value.coerce_f64() {
                    sum += v;
                    count += 1;
                }
                last = Some(record.id);
            }
            if count == 0 {
                return Err(OpError::Arithmetic(
                    "average over zero numeric values".to_string(),
                ));
            }
            let record = DataRecord::new(self.output_schema.clone())
                .with(AVERAGE_FIELD, sum / count as f64)
                .with_parent(last);
            let stats = RecordOpStats::new(
                record.id,
                record.parent_id,
                op_id,
                self.op_name(),
                start.elapsed().as_secs_f64(),
            );
            Ok(vec![RecordWithStats { record, stats }])
        }))
    }
}
