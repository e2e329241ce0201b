//! Shared types for the Agent Turn Loop and Session/Conversation Engine.
//!
//! Block kinds are a closed sum type (spec.md §9): the same `ContentBlock`
//! is used for persisted conversation history (swe-store) and for the wire
//! representation sent to an LLM provider (swe-llm) so there is exactly one
//! definition of what a message can contain.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session identifier, a.k.a. `workerId` in spec.md. Cheaply cloneable.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Message role (spec.md §3 Message). Content blocks such as tool results are
/// carried inside a `User` item even though they originate from a tool, per
/// the Anthropic-style wire convention the provider layer maps onto.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Discriminates what kind of turn-event a `Message` item represents, distinct
/// from `role` (spec.md §3).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    UserMessage,
    AssistantResponse,
    ToolUse,
    ToolResult,
}

/// A content block. Closed sum type shared by persisted history and provider
/// wire requests (spec.md §9).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image bytes.
        bytes: String,
        /// MIME subtype, e.g. "png" or "jpeg". Defaults to "png" when absent
        /// (spec.md §9 open question iii).
        #[serde(default = "default_image_format")]
        format: String,
    },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        id: String,
        content: Vec<ContentBlock>,
        status: ToolResultStatus,
    },

    #[serde(rename = "reasoning")]
    Reasoning {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// A cache-point marker. Never persisted; only appears transiently in
    /// provider wire requests built by the Context Manager (spec.md §4.E).
    #[serde(rename = "cache_point")]
    CachePoint,
}

fn default_image_format() -> String {
    "png".to_string()
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn is_cache_point(&self) -> bool {
        matches!(self, ContentBlock::CachePoint)
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, ContentBlock::Reasoning { .. })
    }

    pub fn as_tool_use(&self) -> Option<(&str, &str, &serde_json::Value)> {
        match self {
            ContentBlock::ToolUse { id, name, input } => Some((id, name, input)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// A single append-only conversation item (spec.md §3 Message).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic sequence number assigned by the Message Store on append.
    /// `0` on a freshly constructed item that hasn't been appended yet.
    #[serde(default)]
    pub seq: u64,
    pub role: Role,
    pub message_type: MessageType,
    pub content: Vec<ContentBlock>,
    /// Incremental input tokens attributed to appending this item. May be
    /// negative for the user item when reasoning blocks were dropped (P3).
    pub token_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            seq: 0,
            role: Role::User,
            message_type: MessageType::UserMessage,
            content: vec![ContentBlock::text(text)],
            token_count: 0,
            model_override: None,
            thinking_budget: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn assistant_response(content: Vec<ContentBlock>) -> Self {
        Self {
            seq: 0,
            role: Role::Assistant,
            message_type: MessageType::AssistantResponse,
            content,
            token_count: 0,
            model_override: None,
            thinking_budget: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn tool_use(content: Vec<ContentBlock>) -> Self {
        Self {
            seq: 0,
            role: Role::Assistant,
            message_type: MessageType::ToolUse,
            content,
            token_count: 0,
            model_override: None,
            thinking_budget: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn tool_result(content: Vec<ContentBlock>) -> Self {
        Self {
            seq: 0,
            role: Role::User,
            message_type: MessageType::ToolResult,
            content,
            token_count: 0,
            model_override: None,
            thinking_budget: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Every `toolUse` block id present in this item, used to verify the
    /// pairing invariant (P1).
    pub fn tool_use_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Session lifecycle status (spec.md §3 Session).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Working,
    Cancelling,
}

/// Token usage reported by an LLM provider response.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_write_input_tokens: u64,
}
