use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde_json: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("storage: {0}")]
    Storage(String),

    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("no replayable cache for '{0}'")]
    CacheNotFound(String),

    #[error("cache '{0}' is not open")]
    CacheNotOpen(String),

    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] semflow_core::error::Error),
}
