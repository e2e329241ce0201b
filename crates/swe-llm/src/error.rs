use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("throttled: {0}")]
    Throttled(String),

    #[error("max tokens exceeded")]
    MaxTokens,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("model {0} does not support this request")]
    UnsupportedModel(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

impl From<LlmError> for swe_core::Error {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Throttled(msg) => swe_core::Error::Throttled(msg),
            LlmError::MaxTokens => swe_core::Error::MaxTokens,
            LlmError::AuthFailed(msg) => swe_core::Error::AuthFailed(msg),
            LlmError::Cancelled => swe_core::Error::Cancelled,
            other => swe_core::Error::provider(other.to_string()),
        }
    }
}
