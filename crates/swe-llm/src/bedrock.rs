//! Bedrock provider: a thin translation layer over the real AWS Bedrock
//! Runtime SDK's `converse()` operation, which is also where this crate's
//! `ConverseRequest`/`ConverseResponse` naming comes from.

use crate::error::{LlmError, LlmResult};
use crate::provider::LlmProvider;
use crate::types::{ConverseRequest, ConverseResponse, StopReason, ToolChoice};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::types as bt;
use aws_smithy_types::Document;
use swe_core::{ContentBlock, Usage};
use tokio_util::sync::CancellationToken;

pub struct BedrockProvider {
    client: aws_sdk_bedrockruntime::Client,
}

impl BedrockProvider {
    pub fn new(client: aws_sdk_bedrockruntime::Client) -> Self {
        Self { client }
    }

    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_bedrockruntime::Client::new(&config))
    }
}

fn json_to_document(value: &serde_json::Value) -> Document {
    match value {
        serde_json::Value::Null => Document::Null,
        serde_json::Value::Bool(b) => Document::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Document::from)
            .unwrap_or(Document::Null),
        serde_json::Value::String(s) => Document::String(s.clone()),
        serde_json::Value::Array(arr) => Document::Array(arr.iter().map(json_to_document).collect()),
        serde_json::Value::Object(obj) => Document::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), json_to_document(v)))
                .collect(),
        ),
    }
}

fn document_to_json(doc: &Document) -> serde_json::Value {
    match doc {
        Document::Null => serde_json::Value::Null,
        Document::Bool(b) => serde_json::Value::Bool(*b),
        Document::Number(n) => serde_json::Number::from_f64(n.to_f64_lossy())
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Document::String(s) => serde_json::Value::String(s.clone()),
        Document::Array(arr) => serde_json::Value::Array(arr.iter().map(document_to_json).collect()),
        Document::Object(obj) => serde_json::Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), document_to_json(v)))
                .collect(),
        ),
    }
}

fn content_block_to_bedrock(block: &ContentBlock) -> Option<bt::ContentBlock> {
    match block {
        ContentBlock::Text { text } => Some(bt::ContentBlock::Text(text.clone())),
        ContentBlock::ToolUse { id, name, input } => Some(bt::ContentBlock::ToolUse(
            bt::ToolUseBlock::builder()
                .tool_use_id(id)
                .name(name)
                .input(json_to_document(input))
                .build()
                .ok()?,
        )),
        ContentBlock::ToolResult { id, content, status } => {
            let blocks: Vec<bt::ToolResultContentBlock> = content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => {
                        Some(bt::ToolResultContentBlock::Text(text.clone()))
                    }
                    _ => None,
                })
                .collect();
            Some(bt::ContentBlock::ToolResult(
                bt::ToolResultBlock::builder()
                    .tool_use_id(id)
                    .set_content(Some(blocks))
                    .status(match status {
                        swe_core::ToolResultStatus::Success => bt::ToolResultStatus::Success,
                        swe_core::ToolResultStatus::Error => bt::ToolResultStatus::Error,
                    })
                    .build()
                    .ok()?,
            ))
        }
        ContentBlock::CachePoint => Some(bt::ContentBlock::CachePoint(
            bt::CachePointBlock::builder()
                .point_type(bt::CachePointType::Default)
                .build()
                .ok()?,
        )),
        ContentBlock::Image { .. } | ContentBlock::Reasoning { .. } => None,
    }
}

fn bedrock_content_to_blocks(blocks: &[bt::ContentBlock]) -> Vec<ContentBlock> {
    blocks
        .iter()
        .filter_map(|b| match b {
            bt::ContentBlock::Text(text) => Some(ContentBlock::Text { text: text.clone() }),
            bt::ContentBlock::ToolUse(tool_use) => Some(ContentBlock::ToolUse {
                id: tool_use.tool_use_id().to_string(),
                name: tool_use.name().to_string(),
                input: document_to_json(tool_use.input()),
            }),
            bt::ContentBlock::ReasoningContent(reasoning) => reasoning
                .reasoning_text()
                .map(|r| ContentBlock::Reasoning {
                    text: r.text().to_string(),
                    signature: r.signature().map(String::from),
                }),
            _ => None,
        })
        .collect()
}

fn classify_bedrock_error<E: std::fmt::Display>(e: E) -> LlmError {
    let message = e.to_string();
    if message.contains("ThrottlingException") || message.contains("TooManyRequests") {
        LlmError::Throttled(message)
    } else if message.contains("AccessDeniedException") || message.contains("UnauthorizedException") {
        LlmError::AuthFailed(message)
    } else {
        LlmError::Provider(message)
    }
}

fn tool_choice_to_bedrock(choice: &ToolChoice) -> bt::ToolChoice {
    match choice {
        ToolChoice::Auto => bt::ToolChoice::Auto(bt::AutoToolChoice::builder().build()),
        ToolChoice::Any => bt::ToolChoice::Any(bt::AnyToolChoice::builder().build()),
        ToolChoice::Tool(name) => bt::ToolChoice::Tool(
            bt::SpecificToolChoice::builder().name(name).build().unwrap(),
        ),
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    async fn converse(
        &self,
        request: &ConverseRequest,
        cancel: Option<&CancellationToken>,
    ) -> LlmResult<ConverseResponse> {
        // Region/profile (CRI) selection already happened one layer up in
        // `LlmClient::converse` (spec.md §4.D step 2); `model_id` here is
        // already the final wire id.
        let wire_model_id = request.model_id.clone();

        let messages: Vec<bt::Message> = request
            .messages
            .iter()
            .map(|m| {
                bt::Message::builder()
                    .role(match m.role {
                        swe_core::Role::User => bt::ConversationRole::User,
                        swe_core::Role::Assistant => bt::ConversationRole::Assistant,
                    })
                    .set_content(Some(
                        m.content
                            .iter()
                            .filter_map(content_block_to_bedrock)
                            .collect(),
                    ))
                    .build()
                    .map_err(|e| LlmError::Provider(e.to_string()))
            })
            .collect::<LlmResult<Vec<_>>>()?;

        // System cache points are their own trailing block, mirroring how a
        // `CachePoint` content block trails a message (spec.md §4.E "The
        // system prompt itself is always followed by one cache point").
        let mut system: Vec<bt::SystemContentBlock> = Vec::with_capacity(request.system.len() * 2);
        for s in &request.system {
            system.push(bt::SystemContentBlock::Text(s.text.clone()));
            if s.cache_point {
                if let Ok(cache_point) = bt::CachePointBlock::builder()
                    .point_type(bt::CachePointType::Default)
                    .build()
                {
                    system.push(bt::SystemContentBlock::CachePoint(cache_point));
                }
            }
        }

        let mut call = self
            .client
            .converse()
            .model_id(&wire_model_id)
            .set_messages(Some(messages))
            .set_system(Some(system))
            .inference_config(
                bt::InferenceConfiguration::builder()
                    .max_tokens(request.inference.max_tokens as i32)
                    .set_temperature(request.inference.temperature)
                    .set_top_p(request.inference.top_p)
                    .set_stop_sequences(Some(request.inference.stop_sequences.clone()))
                    .build(),
            );

        if !request.tools.is_empty() {
            let mut tool_specs: Vec<bt::Tool> = Vec::with_capacity(request.tools.len() * 2);
            for t in &request.tools {
                tool_specs.push(bt::Tool::ToolSpec(
                    bt::ToolSpecification::builder()
                        .name(&t.name)
                        .description(&t.description)
                        .input_schema(bt::ToolInputSchema::Json(json_to_document(
                            &t.input_schema,
                        )))
                        .build()
                        .unwrap(),
                ));
                if t.cache_point {
                    if let Ok(cache_point) = bt::CachePointBlock::builder()
                        .point_type(bt::CachePointType::Default)
                        .build()
                    {
                        tool_specs.push(bt::Tool::CachePoint(cache_point));
                    }
                }
            }
            let mut tool_config = bt::ToolConfiguration::builder().set_tools(Some(tool_specs));
            if let Some(choice) = &request.tool_choice {
                tool_config = tool_config.tool_choice(tool_choice_to_bedrock(choice));
            }
            call = call.tool_config(tool_config.build().map_err(|e| LlmError::Provider(e.to_string()))?);
        }

        if let Some(reasoning) = &request.reasoning {
            if reasoning.enabled {
                let mut fields = serde_json::json!({
                    "thinking": {"type": "enabled", "budget_tokens": reasoning.budget_tokens}
                });
                if reasoning.interleaved {
                    fields["anthropic_beta"] = serde_json::json!(["interleaved-thinking-2025-05-14"]);
                }
                call = call.additional_model_request_fields(json_to_document(&fields));
            }
        }

        let send = call.send();
        let output = match cancel {
            Some(token) => tokio::select! {
                result = send => result.map_err(classify_bedrock_error)?,
                _ = token.cancelled() => return Err(LlmError::Cancelled),
            },
            None => send.await.map_err(classify_bedrock_error)?,
        };

        let message = output
            .output()
            .and_then(|o| o.as_message().ok())
            .ok_or_else(|| LlmError::InvalidResponse("missing message in converse output".into()))?;

        let content = bedrock_content_to_blocks(message.content());
        let stop_reason = match output.stop_reason() {
            bt::StopReason::ToolUse => StopReason::ToolUse,
            bt::StopReason::MaxTokens => StopReason::MaxTokens,
            bt::StopReason::StopSequence => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };
        let usage = output
            .usage()
            .map(|u| Usage {
                input_tokens: u.input_tokens() as u64,
                output_tokens: u.output_tokens() as u64,
                cache_read_input_tokens: u.cache_read_input_tokens().unwrap_or(0) as u64,
                cache_write_input_tokens: u.cache_write_input_tokens().unwrap_or(0) as u64,
            })
            .unwrap_or_default();

        Ok(ConverseResponse {
            content,
            stop_reason,
            usage,
            served_by_account: None,
        })
    }
}
