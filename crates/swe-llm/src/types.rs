//! Neutral request/response types for the LLM Client (spec.md §4.D). Every
//! provider backend translates to and from these types; nothing downstream
//! of `converse()` knows whether it talked to Bedrock or Anthropic.

use serde::{Deserialize, Serialize};
use swe_core::{ContentBlock, Role, Usage};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl LlmMessage {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
    #[serde(default)]
    pub cache_point: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub cache_point: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    Any,
    Tool(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: None,
            top_p: None,
            stop_sequences: Vec::new(),
        }
    }
}

/// Reasoning ("extended thinking") request, computed by normalization
/// (spec.md §4.D step 3) from the model's capability and the "ultrathink"
/// keyword, not set by the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub enabled: bool,
    pub budget_tokens: u32,
    /// Whether the interleaved-thinking beta flag should accompany the call.
    #[serde(default)]
    pub interleaved: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConverseRequest {
    /// A neutral model id from the capability table; providers translate it
    /// to their own wire id (CRI-prefixed for Bedrock, mapped for Anthropic).
    pub model_id: String,
    pub messages: Vec<LlmMessage>,
    #[serde(default)]
    pub system: Vec<SystemBlock>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    pub inference: InferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConverseResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// Which account (by rotation index) served this call, for diagnostics.
    pub served_by_account: Option<usize>,
}
