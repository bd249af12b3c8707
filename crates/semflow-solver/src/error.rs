use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("unsupported task: {0}")]
    Unsupported(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] semflow_core::error::Error),
}
