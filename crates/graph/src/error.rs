use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("Unknown centrality measure: {0}")]
    UnknownMeasure(String),

    #[error("Singular system while computing {0}")]
    SingularMatrix(&'static str),
}
