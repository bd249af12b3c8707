//! Data-source operators: fresh scans of registered datasets and replays of
//! closed caches.
//!
//! Both support a start offset (skipped items are not timed) and an optional
//! cap on emitted items. Every call to `execute` restarts from the first item.

use std::time::Instant;

use serde_json::{Map, Value as Json};

use semflow_core::cost::OperatorCostEstimates;
use semflow_core::record::DataRecord;
use semflow_core::schema::SchemaRef;
use semflow_core::stats::RecordOpStats;
use semflow_io::{DataDirectory, DatasetKind, RecordIter};

use crate::traits::{schema_config, OpError, PhysicalOperator, RecordStream, RecordWithStats};

#[derive(Debug, Clone, PartialEq)]
pub struct MarshalAndScanDataOp {
    output_schema: SchemaRef,
    dataset_id: String,
    num_samples: Option<usize>,
    scan_start_idx: usize,
    should_profile: bool,
}

impl MarshalAndScanDataOp {
    pub fn new(output_schema: SchemaRef, dataset_id: impl Into<String>) -> Self {
        Self {
            output_schema,
            dataset_id: dataset_id.into(),
            num_samples: None,
            scan_start_idx: 0,
            should_profile: false,
        }
    }

    pub fn with_num_samples(mut self, n: Option<usize>) -> Self {
        self.num_samples = n;
        self
    }

    pub fn with_scan_start_idx(mut self, idx: usize) -> Self {
        self.scan_start_idx = idx;
        self
    }

    pub fn with_profiling(mut self, on: bool) -> Self {
        self.should_profile = on;
        self
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }
}

impl PhysicalOperator for MarshalAndScanDataOp {
    fn op_name(&self) -> &'static str {
        "MarshalAndScanDataOp"
    }

    fn input_schema(&self) -> Option<&SchemaRef> {
        None
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.output_schema
    }

    fn op_config(&self) -> Map<String, Json> {
        Map::from_iter([
            schema_config("outputSchema", &self.output_schema),
            ("datasetIdentifier".into(), Json::from(self.dataset_id.clone())),
        ])
    }

    fn cost_estimate(
        &self,
        ctx: &DataDirectory,
        _source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        let cardinality = ctx.get_cardinality(&self.dataset_id)?;
        let size = ctx.get_size(&self.dataset_id)?;
        let per_kb = match ctx.get_registered_dataset_type(&self.dataset_id)? {
            DatasetKind::Dir | DatasetKind::File => ctx.config().cold_scan_time_per_kb,
            DatasetKind::Memory => ctx.config().cache_scan_time_per_kb,
        };
        Ok(scan_estimate(cardinality, size, per_kb, self.num_samples, self.scan_start_idx))
    }

    fn should_profile(&self) -> bool {
        self.should_profile
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a DataDirectory,
        _input: Option<RecordStream<'a>>,
    ) -> Result<RecordStream<'a>, OpError> {
        let inner = ctx.get_registered_dataset(&self.dataset_id)?;
        Ok(Box::new(ScanIter::new(
            inner,
            self.identity(None),
            self.op_name(),
            self.scan_start_idx,
            self.num_samples,
        )))
    }

    fn describe(&self) -> String {
        format!("{}({}, {})", self.op_name(), self.output_schema, self.dataset_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheScanDataOp {
    output_schema: SchemaRef,
    cache_id: String,
    num_samples: Option<usize>,
    scan_start_idx: usize,
    should_profile: bool,
}

impl CacheScanDataOp {
    pub fn new(output_schema: SchemaRef, cache_id: impl Into<String>) -> Self {
        Self {
            output_schema,
            cache_id: cache_id.into(),
            num_samples: None,
            scan_start_idx: 0,
            should_profile: false,
        }
    }

    pub fn with_num_samples(mut self, n: Option<usize>) -> Self {
        self.num_samples = n;
        self
    }

    pub fn with_scan_start_idx(mut self, idx: usize) -> Self {
        self.scan_start_idx = idx;
        self
    }

    pub fn with_profiling(mut self, on: bool) -> Self {
        self.should_profile = on;
        self
    }

    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }
}

impl PhysicalOperator for CacheScanDataOp {
    fn op_name(&self) -> &'static str {
        "CacheScanDataOp"
    }

    fn input_schema(&self) -> Option<&SchemaRef> {
        None
    }

    fn output_schema(&self) -> &SchemaRef {
        &self.output_schema
    }

    fn op_config(&self) -> Map<String, Json> {
        Map::from_iter([
            schema_config("outputSchema", &self.output_schema),
            ("datasetIdentifier".into(), Json::from(self.cache_id.clone())),
        ])
    }

    fn cost_estimate(
        &self,
        ctx: &DataDirectory,
        _source: Option<&OperatorCostEstimates>,
    ) -> Result<OperatorCostEstimates, OpError> {
        let cardinality = ctx.get_cached_cardinality(&self.cache_id)?;
        let size = ctx.get_cached_size(&self.cache_id)?;
        Ok(scan_estimate(
            cardinality,
            size,
            ctx.config().cache_scan_time_per_kb,
            self.num_samples,
            self.scan_start_idx,
        ))
    }

    fn should_profile(&self) -> bool {
        self.should_profile
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a DataDirectory,
        _input: Option<RecordStream<'a>>,
    ) -> Result<RecordStream<'a>, OpError> {
        let inner = ctx.get_cached_result(&self.cache_id)?;
        Ok(Box::new(ScanIter::new(
            inner,
            self.identity(None),
            self.op_name(),
            self.scan_start_idx,
            self.num_samples,
        )))
    }

    fn describe(&self) -> String {
        format!("{}({}, {})", self.op_name(), self.output_schema, self.cache_id)
    }
}

/// Per-record estimate from total count and bytes.
///
/// Cardinality honors the start offset and sample cap so sampled plans are
/// costed on what they actually read.
fn scan_estimate(
    cardinality: usize,
    size_bytes: u64,
    time_per_kb: f64,
    num_samples: Option<usize>,
    scan_start_idx: usize,
) -> OperatorCostEstimates {
    let per_record_kb = (size_bytes as f64 / cardinality.max(1) as f64) / 1024.0;
    let mut emitted = cardinality.saturating_sub(scan_start_idx);
    if let Some(n) = num_samples {
        emitted = emitted.min(n);
    }
    OperatorCostEstimates::new(emitted as f64, time_per_kb * per_record_kb, 0.0, 0.0, 1.0)
}

struct ScanIter<'a> {
    inner: RecordIter<'a>,
    op_id: String,
    op_name: &'static str,
    skip: usize,
    remaining: Option<usize>,
}

impl<'a> ScanIter<'a> {
    fn new(
        inner: RecordIter<'a>,
        op_id: String,
        op_name: &'static str,
        skip: usize,
        cap: Option<usize>,
    ) -> Self {
        Self {
            inner,
            op_id,
            op_name,
            skip,
            remaining: cap,
        }
    }

    fn stats_for(&self, record: &DataRecord, op_time: f64) -> RecordOpStats {
        RecordOpStats::new(
            record.id,
            record.parent_id,
            self.op_id.clone(),
            self.op_name,
            op_time,
        )
    }
}

impl Iterator for ScanIter<'_> {
    type Item = Result<RecordWithStats, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        while self.skip > 0 {
            self.skip -= 1;
            match self.inner.next()? {
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
        let start = Instant::now();
        let item = self.inner.next()?;
        let op_time = start.elapsed().as_secs_f64();
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        Some(item.map_err(OpError::from).map(|record| {
            let stats = self.stats_for(&record, op_time);
            RecordWithStats { record, stats }
        }))
    }
}
