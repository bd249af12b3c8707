//! Streaming limit: passes through the first `limit` records, then stops
//! pulling from upstream.

use serde_json::{Map, Value as Json};

use semflow_core::cost::OperatorCostEstimates;
use semflow_core::schema::SchemaRef;
use semflow_core::stats::RecordOpStats;
use semflow_io::DataDirectory;

use crate::traits::{
    require_input, require_source, schema_config, OpError, PhysicalOperator, RecordStream,
    RecordWithStats,
};

#[derive(Debug, Clone, PartialEq)]
pub struct LimitScanOp {
    schema: SchemaRef,
    limit: usize,
    target_cache_id: Option<String>,
    should_profile: bool,
}

impl LimitScanOp {
    pub fn new(schema: SchemaRef, limit: usize) -> Self {
        Self {
            schema,
            limit,
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

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl PhysicalOperator for LimitScanOp {
    fn op_name(&self) -> &'static str {
        "LimitScanOp"
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
            ("limit".into(), Json::from(self.limit)),
        ])
    }

    fn cost_estimate(
        &self,
        _ctx: &DataDirectory,
        source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        let source = require_source(self.op_name(), source)?;
        Ok(OperatorCostEstimates::negligible(
            source.cardinality().min(self.limit as f64),
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
        Ok(Box::new(input.take(self.limit).map(move |item| {
            item.map(|u| {
                let stats = RecordOpStats::new(
                    u.record.id,
                    u.record.parent_id,
                    op_id.clone(),
                    self.op_name(),
                    0.0,
                );
                RecordWithStats {
                    record: u.record,
                    stats,
                }
            })
        })))
    }

    fn describe(&self) -> String {
        format!("{}({}, {})", self.op_name(), self.schema, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use semflow_core::config::EngineConfig;
    use semflow_core::record::DataRecord;
    use semflow_core::schema::builtin;

    use crate::scan::MarshalAndScanDataOp;

    fn dir(n: i64) -> DataDirectory {
        let mut dd = DataDirectory::in_memory(EngineConfig::default());
        let recs = (0..n)
            .map(|v| DataRecord::new(builtin::number()).with("value", v))
            .collect();
        dd.register_records("nums", builtin::number(), recs).unwrap();
        dd
    }

    #[test]
    fn limit_is_a_prefix_of_min_length() {
        for (n, m) in [(0usize, 5i64), (3, 5), (5, 5), (9, 5), (2, 0)] {
            let dd = dir(m);
            let scan = MarshalAndScanDataOp::new(builtin::number(), "nums");
            let full: Vec<_> = scan
                .execute(&dd, None)
                .unwrap()
                .map(|r| r.unwrap().record)
                .collect();
            let op = LimitScanOp::new(builtin::number(), n);
            let limited: Vec<_> = op
                .execute(&dd, Some(scan.execute(&dd, None).unwrap()))
                .unwrap()
                .map(|r| r.unwrap().record)
                .collect();
            assert_eq!(limited.len(), n.min(m as usize));
            assert_eq!(limited[..], full[..limited.len()]);
        }
    }

    #[test]
    fn stops_pulling_upstream_at_the_cap() {
        let dd = dir(100);
        let scan = MarshalAndScanDataOp::new(builtin::number(), "nums");
        let pulled = Cell::new(0usize);
        let counted: RecordStream<'_> = Box::new(scan.execute(&dd, None).unwrap().inspect(|_| {
            pulled.set(pulled.get() + 1);
        }));
        let op = LimitScanOp::new(builtin::number(), 3);
        assert_eq!(op.execute(&dd, Some(counted)).unwrap().count(), 3);
        assert_eq!(pulled.get(), 3);
    }

    #[test]
    fn estimate_is_min_of_limit_and_source() {
        let dd = dir(0);
        let op = LimitScanOp::new(builtin::number(), 4);
        let small = op
            .cost_estimate(&dd, Some(&OperatorCostEstimates::negligible(2.0)))
            .unwrap();
        let large = op
            .cost_estimate(&dd, Some(&OperatorCostEstimates::negligible(20.0)))
            .unwrap();
        assert_eq!(small.cardinality(), 2.0);
        assert_eq!(large.cardinality(), 4.0);
    }
}
