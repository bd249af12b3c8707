//! Logical operators and plans.
//!
//! A logical plan is a linear sequence: one scan first, then filters,
//! converts, group-bys, aggregates and limits. Each operator after the first
//! reads the output of the one before it.

use std::fmt;

use semflow_core::aggregate::{AggFunc, GroupBySig};
use semflow_core::schema::{builtin, SchemaRef};
use semflow_operators::Cardinality;

use crate::error::{PlanError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOperator {
    BaseScan {
        dataset_id: String,
        output_schema: SchemaRef,
    },
    CacheScan {
        cache_id: String,
        output_schema: SchemaRef,
    },
    FilteredScan {
        input_schema: SchemaRef,
        output_schema: SchemaRef,
        conditions: Vec<String>,
        depends_on: Option<Vec<String>>,
        target_cache_id: Option<String>,
    },
    ConvertScan {
        input_schema: SchemaRef,
        output_schema: SchemaRef,
        cardinality: Cardinality,
        depends_on: Option<Vec<String>>,
        target_cache_id: Option<String>,
    },
    GroupByAggregate {
        input_schema: SchemaRef,
        output_schema: SchemaRef,
        gby_sig: GroupBySig,
        target_cache_id: Option<String>,
    },
    ApplyAggregateFunction {
        input_schema: SchemaRef,
        output_schema: SchemaRef,
        func: AggFunc,
        target_cache_id: Option<String>,
    },
    LimitScan {
        input_schema: SchemaRef,
        output_schema: SchemaRef,
        limit: usize,
        target_cache_id: Option<String>,
    },
}

impl LogicalOperator {
    pub fn kind_name(&self) -> &'static str {
        match self {
            LogicalOperator::BaseScan { .. } => "BaseScan",
            LogicalOperator::CacheScan { .. } => "CacheScan",
            LogicalOperator::FilteredScan { .. } => "FilteredScan",
            LogicalOperator::ConvertScan { .. } => "ConvertScan",
            LogicalOperator::GroupByAggregate { .. } => "GroupByAggregate",
            LogicalOperator::ApplyAggregateFunction { .. } => "ApplyAggregateFunction",
            LogicalOperator::LimitScan { .. } => "LimitScan",
        }
    }

    pub fn is_scan(&self) -> bool {
        matches!(
            self,
            LogicalOperator::BaseScan { .. } | LogicalOperator::CacheScan { .. }
        )
    }

    /// Filters and converts may be permuted within a run; nothing else moves.
    pub fn is_reorderable(&self) -> bool {
        matches!(
            self,
            LogicalOperator::FilteredScan { .. } | LogicalOperator::ConvertScan { .. }
        )
    }

    pub fn is_convert(&self) -> bool {
        matches!(self, LogicalOperator::ConvertScan { .. })
    }

    pub fn output_schema(&self) -> &SchemaRef {
        match self {
            LogicalOperator::BaseScan { output_schema, .. }
            | LogicalOperator::CacheScan { output_schema, .. }
            | LogicalOperator::FilteredScan { output_schema, .. }
            | LogicalOperator::ConvertScan { output_schema, .. }
            | LogicalOperator::GroupByAggregate { output_schema, .. }
            | LogicalOperator::ApplyAggregateFunction { output_schema, .. }
            | LogicalOperator::LimitScan { output_schema, .. } => output_schema,
        }
    }

    pub fn input_schema(&self) -> Option<&SchemaRef> {
        match self {
            LogicalOperator::BaseScan { .. } | LogicalOperator::CacheScan { .. } => None,
            LogicalOperator::FilteredScan { input_schema, .. }
            | LogicalOperator::ConvertScan { input_schema, .. }
            | LogicalOperator::GroupByAggregate { input_schema, .. }
            | LogicalOperator::ApplyAggregateFunction { input_schema, .. }
            | LogicalOperator::LimitScan { input_schema, .. } => Some(input_schema),
        }
    }

    /// Fields a convert adds on top of its input; empty for everything else.
    pub fn generated_fields(&self) -> Vec<String> {
        match self {
            LogicalOperator::ConvertScan {
                input_schema,
                output_schema,
                ..
            } => output_schema.generated_fields(input_schema),
            _ => Vec::new(),
        }
    }

    pub fn depends_on(&self) -> Option<&[String]> {
        match self {
            LogicalOperator::FilteredScan { depends_on, .. }
            | LogicalOperator::ConvertScan { depends_on, .. } => depends_on.as_deref(),
            _ => None,
        }
    }

    pub fn target_cache_id(&self) -> Option<&str> {
        match self {
            LogicalOperator::BaseScan { .. } | LogicalOperator::CacheScan { .. } => None,
            LogicalOperator::FilteredScan {
                target_cache_id, ..
            }
            | LogicalOperator::ConvertScan {
                target_cache_id, ..
            }
            | LogicalOperator::GroupByAggregate {
                target_cache_id, ..
            }
            | LogicalOperator::ApplyAggregateFunction {
                target_cache_id, ..
            }
            | LogicalOperator::LimitScan {
                target_cache_id, ..
            } => target_cache_id.as_deref(),
        }
    }

    pub(crate) fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        if let LogicalOperator::FilteredScan { depends_on, .. }
        | LogicalOperator::ConvertScan { depends_on, .. } = &mut self
        {
            *depends_on = Some(deps);
        }
        self
    }

    pub(crate) fn with_target_cache_id(mut self, id: Option<String>) -> Self {
        match &mut self {
            LogicalOperator::BaseScan { .. } | LogicalOperator::CacheScan { .. } => {}
            LogicalOperator::FilteredScan {
                target_cache_id, ..
            }
            | LogicalOperator::ConvertScan {
                target_cache_id, ..
            }
            | LogicalOperator::GroupByAggregate {
                target_cache_id, ..
            }
            | LogicalOperator::ApplyAggregateFunction {
                target_cache_id, ..
            }
            | LogicalOperator::LimitScan {
                target_cache_id, ..
            } => *target_cache_id = id,
        }
        self
    }

    /// Re-point this operator at a new predecessor output schema.
    ///
    /// Filters and limits pass the schema through; group-bys recompute
    /// their output; converts and aggregates keep theirs.
    pub(crate) fn with_input(mut self, input: SchemaRef) -> Self {
        match &mut self {
            LogicalOperator::BaseScan { .. } | LogicalOperator::CacheScan { .. } => {}
            LogicalOperator::FilteredScan {
                input_schema,
                output_schema,
                ..
            }
            | LogicalOperator::LimitScan {
                input_schema,
                output_schema,
                ..
            } => {
                *input_schema = input.clone();
                *output_schema = input;
            }
            LogicalOperator::ConvertScan { input_schema, .. }
            | LogicalOperator::ApplyAggregateFunction { input_schema, .. } => {
                *input_schema = input;
            }
            LogicalOperator::GroupByAggregate {
                input_schema,
                output_schema,
                gby_sig,
                ..
            } => {
                *output_schema = gby_sig.output_schema(&input);
                *input_schema = input;
            }
        }
        self
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::BaseScan {
                dataset_id,
                output_schema,
            } => write!(f, "BaseScan({dataset_id}, {output_schema})"),
            LogicalOperator::CacheScan {
                cache_id,
                output_schema,
            } => write!(f, "CacheScan({cache_id}, {output_schema})"),
            LogicalOperator::FilteredScan { conditions, .. } => {
                write!(f, "FilteredScan(\"{}\")", conditions.join(" and "))
            }
            LogicalOperator::ConvertScan {
                input_schema,
                output_schema,
                ..
            } => write!(f, "ConvertScan({} -> {})", input_schema.name, output_schema.name),
            LogicalOperator::GroupByAggregate { gby_sig, .. } => {
                write!(f, "GroupByAggregate({})", gby_sig.group_by_fields().join(", "))
            }
            LogicalOperator::ApplyAggregateFunction { func, .. } => {
                write!(f, "ApplyAggregateFunction({func})")
            }
            LogicalOperator::LimitScan { limit, .. } => write!(f, "LimitScan({limit})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalPlan {
    pub operators: Vec<LogicalOperator>,
    pub dataset_id: String,
}

impl LogicalPlan {
    pub fn new(operators: Vec<LogicalOperator>, dataset_id: impl Into<String>) -> Self {
        Self {
            operators,
            dataset_id: dataset_id.into(),
        }
    }

    /// Append `ops` after `subplan`, re-pointing each at its new predecessor.
    pub fn from_ops_and_subplan(ops: Vec<LogicalOperator>, subplan: &LogicalPlan) -> Self {
        let mut operators = subplan.operators.clone();
        for op in ops {
            let op = match operators.last() {
                Some(prev) => op.with_input(prev.output_schema().clone()),
                None => op,
            };
            operators.push(op);
        }
        Self {
            operators,
            dataset_id: subplan.dataset_id.clone(),
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        self.operators
            .last()
            .map(|op| op.output_schema().clone())
            .unwrap_or_else(builtin::file)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// A scan first, no scan anywhere else, and each input schema equal to
    /// the previous output schema.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.operators.first() else {
            return Err(PlanError::Contract("empty logical plan".into()));
        };
        if !first.is_scan() {
            return Err(PlanError::Contract(format!(
                "logical plan must start with a scan, found {}",
                first.kind_name()
            )));
        }
        for pair in self.operators.windows(2) {
            let (prev, op) = (&pair[0], &pair[1]);
            if op.is_scan() {
                return Err(PlanError::Contract(format!(
                    "scan {op} may only appear first in a plan"
                )));
            }
            if op.input_schema() != Some(prev.output_schema()) {
                return Err(PlanError::Contract(format!(
                    "{op} reads {} but its predecessor produces {}",
                    op.input_schema().map(|s| s.name.as_str()).unwrap_or("nothing"),
                    prev.output_schema().name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.operators.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semflow_core::schema::{Field, Schema};

    fn email() -> SchemaRef {
        Schema::new(
            "Email",
            "An email",
            vec![
                Field::string("filename", "name"),
                Field::string("contents", "body"),
                Field::string("sender", "from"),
            ],
        )
        .into_ref()
    }

    #[test]
    fn convert_generates_fields_missing_from_input() {
        let op = LogicalOperator::ConvertScan {
            input_schema: builtin::text_file(),
            output_schema: email(),
            cardinality: Cardinality::OneToOne,
            depends_on: None,
            target_cache_id: None,
        };
        assert_eq!(op.generated_fields(), vec!["sender".to_string()]);
        assert!(op.is_reorderable());
    }

    #[test]
    fn joining_rewires_filters_to_the_new_predecessor() {
        let scan = LogicalOperator::BaseScan {
            dataset_id: "d".into(),
            output_schema: builtin::text_file(),
        };
        let convert = LogicalOperator::ConvertScan {
            input_schema: builtin::text_file(),
            output_schema: email(),
            cardinality: Cardinality::OneToOne,
            depends_on: None,
            target_cache_id: None,
        };
        let filter = LogicalOperator::FilteredScan {
            input_schema: builtin::text_file(),
            output_schema: builtin::text_file(),
            conditions: vec!["x".into()],
            depends_on: None,
            target_cache_id: None,
        };
        let base = LogicalPlan::new(vec![scan], "d");
        let plan = LogicalPlan::from_ops_and_subplan(vec![convert, filter], &base);
        assert_eq!(plan.operators[2].input_schema(), Some(&email()));
        assert_eq!(plan.output_schema(), email());
        plan.validate().unwrap();
    }

    #[test]
    fn validate_rejects_missing_or_misplaced_scans() {
        let limit = LogicalOperator::LimitScan {
            input_schema: builtin::file(),
            output_schema: builtin::file(),
            limit: 1,
            target_cache_id: None,
        };
        assert!(LogicalPlan::new(vec![], "d").validate().is_err());
        assert!(LogicalPlan::new(vec![limit], "d").validate().is_err());
    }
}
