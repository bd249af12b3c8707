#![forbid(unsafe_code)]
//! semflow-planner: from a declarative pipeline to costed physical plans.
//!
//! Flow:
//! - `builder::Dataset` (or a YAML pipeline via `dsl`) declares the steps
//! - `naive_logical_plan` turns it into a declared-order `LogicalPlan`
//! - `reorder` enumerates every dependency-legal ordering of each run of
//!   filters/converts between fixed operators
//! - `physical` lowers each logical plan through the solver
//! - `cost` folds operator estimates and picks a plan under a `Policy`

pub mod builder;
pub mod candidates;
pub mod cost;
pub mod dsl;
pub mod error;
pub mod logical;
pub mod physical;
pub mod reorder;

pub use builder::{naive_logical_plan, Dataset, NodeKind};
pub use candidates::{choose_candidate, plan_candidates, Candidate};
pub use cost::{choose_plan, estimate_plan_cost, PlanCost, Policy};
pub use dsl::yaml::{parse_yaml_pipeline, ParsedPipeline, PipelineConfig};
pub use error::{PlanError, Result};
pub use logical::{LogicalOperator, LogicalPlan};
pub use physical::{generate_physical_plans, lower_to_physical, LowerOptions, PhysicalPlan};
pub use reorder::{compute_legal_permutations, compute_logical_plan_reorderings};
