use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building schemas, signatures and config.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Group-by signatures that don't line up with their fields.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Canonical JSON could not be produced for hashing.
    #[error("serialization for hashing failed: {0}")]
    Hash(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
