use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Store error: {0}")]
    StoreError(#[from] geonet_store::StoreError),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),
}
