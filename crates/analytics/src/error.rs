use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Unknown analysis type: {0}")]
    UnknownType(String),

    #[error("Analysis type {0} is disabled")]
    Disabled(String),

    #[error("Invalid inputs: {0}")]
    InvalidInputs(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Inference backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] geonet_store::StoreError),

    #[error("Ledger error: {0}")]
    LedgerError(#[from] geonet_ledger::LedgerError),

    #[error("Conversion error: {0}")]
    ConversionError(#[from] geonet_conversion::ConversionError),

    #[error("Graph error: {0}")]
    GraphError(#[from] geonet_graph::GraphError),
}
