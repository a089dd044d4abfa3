use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Unsupported repository snapshot schema_version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("{0}")]
    Other(String),
}
