#![forbid(unsafe_code)]
//! semflow-solver: turns an abstract task into something that runs.
//!
//! A `TaskDescriptor` (kind, params, output schema, input schema) is the only
//! contract between the physical layer and this crate. `Solver::synthesize`
//! resolves it, in precedence order, to a field copy, a hard-coded transform,
//! or an LLM-backed function. External capabilities (LLM, vision, PDF text
//! extraction) sit behind the traits in `services`.

pub mod error;
pub mod services;
pub mod solver;
pub mod task;

pub use error::{Result, SolverError};
pub use services::{
    Completion, LlmService, LocalPdfExtractor, PromptSignature, Services, TextExtractor, Usage,
    VisionService,
};
pub use solver::{
    AggregateFn, ConversionStrategy, ConvertFn, FilterFn, HardCoded, Outcome, Solver, Synthesized,
};
pub use task::{TaskDescriptor, TaskKind, TaskParams};
