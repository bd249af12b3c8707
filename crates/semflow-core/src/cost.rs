//! Operator cost estimates.
//!
//! Every physical operator produces one of these per cost-estimation call.
//! Downstream estimates are derived from the upstream one; nothing mutates an
//! estimate after construction.

use serde::{Deserialize, Serialize};

/// Hex characters kept from an operator's configuration hash.
pub const MAX_OP_ID_CHARS: usize = 6;

/// Group count assumed for a group-by when no execution history exists.
pub const NAIVE_EST_NUM_GROUPS: f64 = 3.0;

/// Fraction of records assumed to pass an LLM filter.
pub const NAIVE_EST_FILTER_SELECTIVITY: f64 = 0.5;

/// Output-per-input multiplier assumed for one-to-many converts.
pub const NAIVE_EST_ONE_TO_MANY_SELECTIVITY: f64 = 2.0;

/// Latency of one LLM question-answering invocation.
pub const NAIVE_EST_LLM_CALL_SECONDS: f64 = 1.5;

/// Output tokens produced by one LLM invocation.
pub const NAIVE_EST_OUTPUT_TOKENS: f64 = 50.0;

/// Input tokens consumed per KB of serialized record context.
pub const NAIVE_EST_TOKENS_PER_KB: f64 = 256.0;

/// Serialized record context assumed per LLM call, in KB.
pub const NAIVE_EST_RECORD_KB: f64 = 4.0;

/// USD per input / output token for the default model.
pub const NAIVE_EST_USD_PER_INPUT_TOKEN: f64 = 0.15 / 1e6;
pub const NAIVE_EST_USD_PER_OUTPUT_TOKEN: f64 = 0.6 / 1e6;

/// Quality assumed for an LLM-synthesized conversion or filter.
pub const NAIVE_EST_LLM_QUALITY: f64 = 0.85;

/// Latency of a hard-coded local transform (e.g. PDF text extraction).
pub const NAIVE_EST_HARDCODED_SECONDS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatorCostEstimates {
    cardinality: f64,
    time_per_record: f64,
    cost_per_record: f64,
    output_tokens_per_record: f64,
    quality: f64,
}

impl OperatorCostEstimates {
    /// Negative or NaN inputs clamp to 0; quality clamps into [0, 1].
    pub fn new(
        cardinality: f64,
        time_per_record: f64,
        cost_per_record: f64,
        output_tokens_per_record: f64,
        quality: f64,
    ) -> Self {
        Self {
            cardinality: non_negative(cardinality),
            time_per_record: non_negative(time_per_record),
            cost_per_record: non_negative(cost_per_record),
            output_tokens_per_record: non_negative(output_tokens_per_record),
            quality: non_negative(quality).min(1.0),
        }
    }

    /// An operator that adds no time, cost, or error on top of its input.
    pub fn negligible(cardinality: f64) -> Self {
        Self::new(cardinality, 0.0, 0.0, 0.0, 1.0)
    }

    pub fn cardinality(&self) -> f64 {
        self.cardinality
    }

    pub fn time_per_record(&self) -> f64 {
        self.time_per_record
    }

    pub fn cost_per_record(&self) -> f64 {
        self.cost_per_record
    }

    pub fn output_tokens_per_record(&self) -> f64 {
        self.output_tokens_per_record
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_nan() || v < 0.0 {
        0.0
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_clamps_out_of_range_inputs() {
        let est = OperatorCostEstimates::new(-1.0, f64::NAN, 2.0, 0.0, 1.7);
        assert_eq!(est.cardinality(), 0.0);
        assert_eq!(est.time_per_record(), 0.0);
        assert_eq!(est.cost_per_record(), 2.0);
        assert_eq!(est.quality(), 1.0);
    }

    #[test]
    fn negligible_keeps_cardinality() {
        let est = OperatorCostEstimates::negligible(42.0);
        assert_eq!(est.cardinality(), 42.0);
        assert_eq!(est.time_per_record(), 0.0);
        assert_eq!(est.quality(), 1.0);
    }
}
