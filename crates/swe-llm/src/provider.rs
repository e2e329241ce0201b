//! Provider abstraction (spec.md §4.D). A neutral [`ConverseRequest`] goes in,
//! a neutral [`ConverseResponse`] comes out; `converse()` in `lib.rs` is the
//! only place that knows how to pick and normalize for a given backend.

use crate::error::LlmResult;
use crate::types::{ConverseRequest, ConverseResponse};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Single non-streaming call, mirroring the real Bedrock Rust SDK's
    /// `converse()` operation.
    async fn converse(
        &self,
        request: &ConverseRequest,
        cancel: Option<&CancellationToken>,
    ) -> LlmResult<ConverseResponse>;
}
