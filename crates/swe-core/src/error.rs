//! Crate-wide error taxonomy (spec.md §7)

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Provider backpressure. Callers rotate accounts and retry; never surfaced to the user.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Model hit its output token cap. Callers escalate the budget and retry.
    #[error("max tokens exceeded")]
    MaxTokens,

    /// Escalation budget for MaxTokens was exhausted.
    #[error("max tokens retries exhausted after {0} escalations")]
    MaxTokensExhausted(usize),

    /// Tool input failed schema validation. Converted to a textual tool result, never fatal.
    #[error("invalid tool input for {name}: {message}")]
    InvalidToolInput { name: String, message: String },

    /// Tool handler raised an exception. Converted to a textual tool result, never fatal.
    #[error("tool handler error for {name}: {message}")]
    ToolHandlerError { name: String, message: String },

    /// Any other LLM failure. Aborts the turn; session status is left as `working`.
    #[error("provider error: {0}")]
    ProviderError(String),

    /// Durable-store failure on an append path. Propagates — the state machine cannot
    /// proceed without a durable append.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Cooperative cancellation observed at a suspension point.
    #[error("cancelled")]
    Cancelled,

    /// Authentication against an external system failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::ProviderError(message.into())
    }

    /// Whether this error is a condition the Agent Turn Loop's outer retry wrapper
    /// should retry (spec.md §4.F / §7): throttling and max-tokens escalation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Throttled(_) | Error::MaxTokens)
    }
}
