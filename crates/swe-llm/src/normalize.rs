//! Request normalization (spec.md §4.D step 3): adjusts a neutral
//! `ConverseRequest` to what the selected model actually supports, and
//! computes reasoning enablement/budget, before the request reaches a
//! provider backend.

use crate::capability::{CacheLayer, ModelCapability};
use crate::types::{ConverseRequest, ReasoningConfig};
use swe_core::{ContentBlock, Role};

const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_REASONING_BUDGET: u32 = 2000;
const ULTRATHINK_MAX_BUDGET: u32 = 31_999;
const ULTRATHINK_KEYWORD: &str = "ultrathink";

/// Normalizes `request` in place for `capability`, given how many times this
/// turn has already retried after a `max_tokens` stop reason. Returns the
/// "ultra" reasoning budget when it was applied (non-default), so the caller
/// can surface it to observers per spec.md §4.D step 7.
pub fn normalize(
    request: &mut ConverseRequest,
    capability: &ModelCapability,
    max_tokens_retry_count: u32,
) -> Option<u32> {
    if let Some(choice) = &request.tool_choice {
        if !capability.supports_tool_choice(choice) {
            tracing::warn!(
                model = capability.model_id,
                "dropping tool_choice: model does not support requested kind"
            );
            request.tool_choice = None;
        }
    }

    let mut adjusted_max = capability
        .max_output_tokens
        .min(DEFAULT_MAX_TOKENS.saturating_mul(1 << max_tokens_retry_count.min(16)));

    let ultra_budget = enable_reasoning(request, capability);
    if let Some(reasoning) = &request.reasoning {
        adjusted_max = adjusted_max.max(
            (reasoning.budget_tokens.saturating_mul(2)).min(capability.max_output_tokens),
        );
    } else {
        strip_reasoning_blocks_everywhere(request);
    }

    request.inference.max_tokens = adjusted_max;

    prune_cache_points(request, capability);

    ultra_budget
}

/// Reasoning enablement (spec.md §4.D step 3 "Reasoning enablement"): the
/// model must support it, `toolChoice` must be unset, and the model must not
/// be mid-tool-chain (the second-to-last message is a tool-use item with no
/// reasoning block preceding it in that same turn).
fn enable_reasoning(request: &mut ConverseRequest, capability: &ModelCapability) -> Option<u32> {
    if !capability.reasoning_support || request.tool_choice.is_some() {
        request.reasoning = None;
        return None;
    }

    if mid_tool_chain_without_reasoning(request) {
        request.reasoning = None;
        return None;
    }

    let ultrathink = last_user_text(request)
        .map(|t| t.to_lowercase().contains(ULTRATHINK_KEYWORD))
        .unwrap_or(false);

    let (budget, is_ultra) = if ultrathink {
        let half = capability.max_output_tokens / 2;
        (half.min(ULTRATHINK_MAX_BUDGET), true)
    } else {
        (DEFAULT_REASONING_BUDGET, false)
    };

    request.reasoning = Some(ReasoningConfig {
        enabled: true,
        budget_tokens: budget,
        interleaved: capability.interleaved_thinking_support,
    });

    if is_ultra {
        Some(budget)
    } else {
        None
    }
}

/// True when `messages[len-2]` is an assistant tool-use item whose content
/// contains no `Reasoning` block preceding its tool-use blocks — i.e.
/// reasoning was never injected into this tool chain and shouldn't be
/// injected mid-stream now (spec.md §9 open question i: mirrored literally
/// against the immediate prior message, not the whole chain).
fn mid_tool_chain_without_reasoning(request: &ConverseRequest) -> bool {
    let len = request.messages.len();
    if len < 2 {
        return false;
    }
    let second_to_last = &request.messages[len - 2];
    let has_tool_use = second_to_last
        .content
        .iter()
        .any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    if !has_tool_use {
        return false;
    }
    let has_preceding_reasoning = second_to_last.content.iter().any(|b| b.is_reasoning());
    !has_preceding_reasoning
}

fn last_user_text(request: &ConverseRequest) -> Option<String> {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| {
            m.content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
}

fn strip_reasoning_blocks_everywhere(request: &mut ConverseRequest) {
    for message in &mut request.messages {
        strip_reasoning_blocks(&mut message.content);
    }
}

/// Drops `Reasoning` blocks from a message's content when reasoning is
/// disabled for this call (`strip_reasoning_blocks_everywhere`, above). This
/// is what makes a stale reasoning block's tokens fall out of the provider's
/// billed input count; the Agent Turn Loop turns that gap into the negative
/// `tokenCount` delta on the triggering user item (spec.md §8 P3) by
/// comparing billed tokens against the sum already persisted.
fn strip_reasoning_blocks(content: &mut Vec<ContentBlock>) {
    content.retain(|b| !b.is_reasoning());
}

fn prune_cache_points(request: &mut ConverseRequest, capability: &ModelCapability) {
    if !capability.supports_cache(CacheLayer::Message) {
        for message in &mut request.messages {
            message.content.retain(|b| !b.is_cache_point());
        }
    }
    if !capability.supports_cache(CacheLayer::System) {
        for system in &mut request.system {
            system.cache_point = false;
        }
    }
    if !capability.supports_cache(CacheLayer::Tool) {
        for tool in &mut request.tools {
            tool.cache_point = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::capability_for;
    use crate::types::{InferenceConfig, LlmMessage};
    use swe_core::ContentBlock as CB;

    fn base_request(messages: Vec<LlmMessage>) -> ConverseRequest {
        ConverseRequest {
            model_id: "claude-sonnet-4".into(),
            messages,
            system: vec![],
            tools: vec![],
            tool_choice: None,
            inference: InferenceConfig::default(),
            reasoning: None,
        }
    }

    #[test]
    fn reasoning_enabled_by_default_at_default_budget() {
        let cap = capability_for("claude-sonnet-4").unwrap();
        let mut req = base_request(vec![LlmMessage::user(vec![CB::text("hello")])]);
        let ultra = normalize(&mut req, cap, 0);
        assert!(ultra.is_none());
        let reasoning = req.reasoning.unwrap();
        assert!(reasoning.enabled);
        assert_eq!(reasoning.budget_tokens, DEFAULT_REASONING_BUDGET);
    }

    #[test]
    fn ultrathink_keyword_raises_budget_and_is_reported() {
        let cap = capability_for("claude-sonnet-4").unwrap();
        let mut req = base_request(vec![LlmMessage::user(vec![CB::text(
            "please Ultrathink about this",
        )])]);
        let ultra = normalize(&mut req, cap, 0);
        let expected = (cap.max_output_tokens / 2).min(ULTRATHINK_MAX_BUDGET);
        assert_eq!(ultra, Some(expected));
        assert_eq!(req.reasoning.unwrap().budget_tokens, expected);
    }

    #[test]
    fn reasoning_disabled_mid_tool_chain_without_prior_reasoning() {
        let cap = capability_for("claude-sonnet-4").unwrap();
        let mut req = base_request(vec![
            LlmMessage::user(vec![CB::text("list files")]),
            LlmMessage::assistant(vec![CB::ToolUse {
                id: "t1".into(),
                name: "bash".into(),
                input: serde_json::json!({}),
            }]),
            LlmMessage::user(vec![CB::ToolResult {
                id: "t1".into(),
                content: vec![CB::text("a.txt")],
                status: swe_core::ToolResultStatus::Success,
            }]),
        ]);
        normalize(&mut req, cap, 0);
        assert!(req.reasoning.is_none());
    }

    #[test]
    fn max_tokens_retry_doubles_adjusted_cap() {
        let cap = capability_for("claude-haiku-4").unwrap();
        let mut req = base_request(vec![LlmMessage::user(vec![CB::text("hi")])]);
        normalize(&mut req, cap, 0);
        let first = req.inference.max_tokens;
        let mut req2 = base_request(vec![LlmMessage::user(vec![CB::text("hi")])]);
        normalize(&mut req2, cap, 1);
        assert!(req2.inference.max_tokens >= first);
    }

    #[test]
    fn cache_points_pruned_per_unsupported_layer() {
        let cap = capability_for("claude-haiku-4").unwrap();
        let mut req = base_request(vec![LlmMessage::user(vec![
            CB::text("hi"),
            CB::CachePoint,
        ])]);
        req.tools.push(crate::types::ToolSpec {
            name: "t".into(),
            description: "d".into(),
            input_schema: serde_json::json!({}),
            cache_point: true,
        });
        normalize(&mut req, cap, 0);
        assert!(!req.tools[0].cache_point);
    }
}
