use thiserror::Error;

use semflow_operators::OpError;
use semflow_solver::SolverError;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    /// Pipeline construction bug: an operator shape the planner cannot handle.
    #[error("planning contract violated: {0}")]
    Contract(String),

    #[error("pipeline definition: {0}")]
    Dsl(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Core(#[from] semflow_core::error::Error),

    #[error(transparent)]
    Io(#[from] semflow_io::Error),

    #[error(transparent)]
    Operator(#[from] OpError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}
