use thiserror::Error;

pub type Result<T> = std::result::Result<T, TopologyError>;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Store error: {0}")]
    StoreError(#[from] geonet_store::StoreError),

    #[error("Extraction task failed: {0}")]
    TaskFailed(String),

    #[error("Invalid network feature: {0}")]
    InvalidFeature(String),
}
