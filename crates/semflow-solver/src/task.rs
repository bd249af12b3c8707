//! Task descriptors: the solver's only input.

use std::str::FromStr;

use semflow_core::aggregate::AggFunc;
use semflow_core::schema::SchemaRef;

use crate::error::SolverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Build an output record from an input record of another schema.
    InduceFromCandidateOp,
    /// Decide whether a record passes a set of natural-language conditions.
    FilterCandidateOp,
    /// Reduce a whole record stream to a single record.
    ApplyAggFunctionOp,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::InduceFromCandidateOp => "InduceFromCandidateOp",
            TaskKind::FilterCandidateOp => "FilterCandidateOp",
            TaskKind::ApplyAggFunctionOp => "ApplyAggFunctionOp",
        }
    }
}

impl FromStr for TaskKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InduceFromCandidateOp" | "ParallelInduceFromCandidateOp" => {
                Ok(TaskKind::InduceFromCandidateOp)
            }
            "FilterCandidateOp" | "ParallelFilterCandidateOp" => Ok(TaskKind::FilterCandidateOp),
            "ApplyAggFunctionOp" => Ok(TaskKind::ApplyAggFunctionOp),
            other => Err(SolverError::Unsupported(format!("task kind '{other}'"))),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskParams {
    None,
    /// Filter conditions; all must hold.
    Conditions(Vec<String>),
    Aggregate(AggFunc),
}

#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub params: TaskParams,
    pub output: SchemaRef,
    pub input: SchemaRef,
}

impl TaskDescriptor {
    pub fn convert(output: SchemaRef, input: SchemaRef) -> Self {
        Self {
            kind: TaskKind::InduceFromCandidateOp,
            params: TaskParams::None,
            output,
            input,
        }
    }

    /// Filters keep the schema, so output and input are the same.
    pub fn filter(schema: SchemaRef, conditions: Vec<String>) -> Self {
        Self {
            kind: TaskKind::FilterCandidateOp,
            params: TaskParams::Conditions(conditions),
            output: schema.clone(),
            input: schema,
        }
    }

    pub fn aggregate(func: AggFunc, output: SchemaRef, input: SchemaRef) -> Self {
        Self {
            kind: TaskKind::ApplyAggFunctionOp,
            params: TaskParams::Aggregate(func),
            output,
            input,
        }
    }
}

impl std::fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {:?}, {}, {})",
            self.kind, self.params, self.output.name, self.input.name
        )
    }
}
