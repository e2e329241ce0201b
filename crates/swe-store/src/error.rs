use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("conditional check failed: {0}")]
    ConditionFailed(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for swe_core::Error {
    fn from(e: StoreError) -> Self {
        swe_core::Error::storage(e.to_string())
    }
}
