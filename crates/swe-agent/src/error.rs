use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("max tool iterations ({0}) exceeded for this turn")]
    MaxIterationsExceeded(usize),

    #[error("mcp dispatch failed: {0}")]
    McpDispatchFailed(String),

    #[error(transparent)]
    Store(#[from] swe_store::StoreError),

    #[error(transparent)]
    Llm(#[from] swe_llm::LlmError),

    #[error(transparent)]
    Core(#[from] swe_core::Error),
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;

impl From<AgentError> for swe_core::Error {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Store(inner) => inner.into(),
            AgentError::Llm(inner) => inner.into(),
            AgentError::Core(inner) => inner,
            other => swe_core::Error::internal(other.to_string()),
        }
    }
}
