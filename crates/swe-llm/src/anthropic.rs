//! Anthropic-direct provider: a single non-streaming POST to `/v1/messages`.
//! Request/response translation mirrors the teacher's SSE-based Anthropic
//! client's header and status-code handling, adapted to the spec's
//! single-shot `converse()` contract instead of a streamed response.

use crate::error::{LlmError, LlmResult};
use crate::provider::LlmProvider;
use crate::types::{ConverseRequest, ConverseResponse, StopReason, ToolChoice};
use async_trait::async_trait;
use serde_json::{json, Value};
use swe_core::{ContentBlock, Usage};
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

fn content_block_to_anthropic(block: &ContentBlock) -> Option<Value> {
    match block {
        ContentBlock::Text { text } => Some(json!({"type": "text", "text": text})),
        ContentBlock::Image { bytes, format } => Some(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": format!("image/{format}"),
                "data": bytes,
            }
        })),
        ContentBlock::ToolUse { id, name, input } => Some(json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        })),
        ContentBlock::ToolResult { id, content, status } => Some(json!({
            "type": "tool_result",
            "tool_use_id": id,
            "content": content.iter().filter_map(content_block_to_anthropic).collect::<Vec<_>>(),
            "is_error": matches!(status, swe_core::ToolResultStatus::Error),
        })),
        ContentBlock::Reasoning { text, signature } => Some(json!({
            "type": "thinking",
            "thinking": text,
            "signature": signature.clone().unwrap_or_default(),
        })),
        ContentBlock::CachePoint => None,
    }
}

/// Converts a message's content list, folding a trailing `CachePoint` marker
/// into a `cache_control` annotation on the preceding block rather than
/// emitting it as its own wire element.
fn content_list_to_anthropic(blocks: &[ContentBlock]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(blocks.len());
    for block in blocks {
        if block.is_cache_point() {
            if let Some(last) = out.last_mut() {
                if let Some(obj) = last.as_object_mut() {
                    obj.insert("cache_control".to_string(), json!({"type": "ephemeral"}));
                }
            }
            continue;
        }
        if let Some(v) = content_block_to_anthropic(block) {
            out.push(v);
        }
    }
    out
}

fn tool_choice_to_anthropic(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({"type": "auto"}),
        ToolChoice::Any => json!({"type": "any"}),
        ToolChoice::Tool(name) => json!({"type": "tool", "name": name}),
    }
}

fn anthropic_content_to_blocks(content: &[Value]) -> LlmResult<Vec<ContentBlock>> {
    content
        .iter()
        .map(|v| {
            let kind = v
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| LlmError::InvalidResponse("content block missing type".into()))?;
            match kind {
                "text" => Ok(ContentBlock::Text {
                    text: v
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default()
                        .to_string(),
                }),
                "tool_use" => Ok(ContentBlock::ToolUse {
                    id: v.get("id").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                    name: v.get("name").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
                    input: v.get("input").cloned().unwrap_or(json!({})),
                }),
                "thinking" => Ok(ContentBlock::Reasoning {
                    text: v
                        .get("thinking")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    signature: v
                        .get("signature")
                        .and_then(|t| t.as_str())
                        .map(String::from),
                }),
                other => Err(LlmError::InvalidResponse(format!(
                    "unrecognized content block type: {other}"
                ))),
            }
        })
        .collect()
}

fn stop_reason_from_anthropic(reason: &str) -> StopReason {
    match reason {
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn converse(
        &self,
        request: &ConverseRequest,
        cancel: Option<&CancellationToken>,
    ) -> LlmResult<ConverseResponse> {
        let model_id = crate::anthropic_models::to_anthropic_model_id(&request.model_id)
            .ok_or_else(|| LlmError::UnsupportedModel(request.model_id.clone()))?;

        let mut body = json!({
            "model": model_id,
            "max_tokens": request.inference.max_tokens,
            "messages": request.messages.iter().map(|m| json!({
                "role": match m.role { swe_core::Role::User => "user", swe_core::Role::Assistant => "assistant" },
                "content": content_list_to_anthropic(&m.content),
            })).collect::<Vec<_>>(),
        });

        if !request.system.is_empty() {
            let system: Vec<Value> = request
                .system
                .iter()
                .map(|s| {
                    let mut block = json!({"type": "text", "text": s.text});
                    if s.cache_point {
                        block["cache_control"] = json!({"type": "ephemeral"});
                    }
                    block
                })
                .collect();
            body["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    let mut block = json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    });
                    if t.cache_point {
                        block["cache_control"] = json!({"type": "ephemeral"});
                    }
                    block
                })
                .collect();
            body["tools"] = json!(tools);
        }

        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = tool_choice_to_anthropic(choice);
        }

        if let Some(temperature) = request.inference.temperature {
            body["temperature"] = json!(temperature);
        }

        let mut interleaved_thinking = false;
        if let Some(reasoning) = &request.reasoning {
            body["thinking"] = if reasoning.enabled {
                interleaved_thinking = reasoning.interleaved;
                json!({"type": "enabled", "budget_tokens": reasoning.budget_tokens})
            } else {
                json!({"type": "disabled"})
            };
        }

        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        if interleaved_thinking {
            builder = builder.header("anthropic-beta", "interleaved-thinking-2025-05-14");
        }
        let send = builder
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let response = match cancel {
            Some(token) => tokio::select! {
                result = send => result?,
                _ = token.cancelled() => return Err(LlmError::Cancelled),
            },
            None => send.await?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed(text),
                429 => LlmError::Throttled(text),
                _ => LlmError::Provider(format!("{status}: {text}")),
            });
        }

        let payload: Value = response.json().await?;
        let content = payload
            .get("content")
            .and_then(|c| c.as_array())
            .map(|arr| anthropic_content_to_blocks(arr))
            .transpose()?
            .unwrap_or_default();
        let stop_reason = payload
            .get("stop_reason")
            .and_then(|r| r.as_str())
            .map(stop_reason_from_anthropic)
            .unwrap_or(StopReason::EndTurn);
        let usage_json = payload.get("usage").cloned().unwrap_or(json!({}));
        let usage = Usage {
            input_tokens: usage_json.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            output_tokens: usage_json.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            cache_read_input_tokens: usage_json
                .get("cache_read_input_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            cache_write_input_tokens: usage_json
                .get("cache_creation_input_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        };

        Ok(ConverseResponse {
            content,
            stop_reason,
            usage,
            served_by_account: None,
        })
    }
}
