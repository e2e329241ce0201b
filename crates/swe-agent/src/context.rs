//! Context Manager (spec.md §4.E): builds the provider-facing message window
//! from the persisted conversation log, enforcing the context-window cap via
//! middle-out truncation, and places cache points.

use swe_core::{ContentBlock, Message, MessageType};
use swe_llm::LlmMessage;

/// Soft cap enforced by middle-out filtering: ~95% of a 200k context window.
pub const DEFAULT_TOKEN_CAP: u64 = 190_000;

pub struct FilteredContext {
    /// The subset of persisted items that survived filtering, in order.
    pub items: Vec<Message>,
    /// The same items projected into the provider wire format.
    pub messages: Vec<LlmMessage>,
    pub total_tokens: u64,
    /// Whether middle-out removed a range (invalidates prior cache points).
    pub middle_out_applied: bool,
}

fn project(items: &[Message]) -> (Vec<LlmMessage>, u64) {
    let messages = items
        .iter()
        .map(|m| LlmMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect();
    let total: i64 = items.iter().map(|m| m.token_count).sum();
    (messages, total.max(0) as u64)
}

/// Identity projection: no truncation, used while the log is under the cap.
pub fn no_op_filtering(items: &[Message]) -> FilteredContext {
    let (messages, total_tokens) = project(items);
    FilteredContext {
        items: items.to_vec(),
        messages,
        total_tokens,
        middle_out_applied: false,
    }
}

/// Removes a contiguous middle range of items to bring the total under
/// `cap`, preserving the earliest item (system framing, initial task
/// statement) and the latest items (the current tool chain). The range is
/// chosen greedily: the suffix grows backward from the end for as long as
/// prefix+suffix still fits, maximizing what's retained. The `toolUse`/
/// `toolResult` pairing invariant (spec.md §3) is never violated, even if
/// honoring it pushes the result slightly over `cap`.
pub fn middle_out_filtering(items: &[Message], cap: u64) -> FilteredContext {
    if items.len() <= 2 {
        return no_op_filtering(items);
    }

    let total: i64 = items.iter().map(|m| m.token_count).sum();
    if (total.max(0) as u64) <= cap {
        return no_op_filtering(items);
    }

    let prefix_end = 1usize;
    let mut suffix_start = items.len() - 1;

    loop {
        if suffix_start <= prefix_end {
            break;
        }
        let candidate = suffix_start - 1;
        let prefix_tokens: i64 = items[..prefix_end].iter().map(|m| m.token_count).sum();
        let suffix_tokens: i64 = items[candidate..].iter().map(|m| m.token_count).sum();
        if (prefix_tokens + suffix_tokens).max(0) as u64 <= cap {
            suffix_start = candidate;
        } else {
            break;
        }
    }

    // Never start the suffix on an orphaned toolResult; pull its toolUse in too.
    if suffix_start > 0 && items[suffix_start].message_type == MessageType::ToolResult {
        suffix_start -= 1;
    }

    let mut kept: Vec<Message> = Vec::with_capacity(prefix_end + (items.len() - suffix_start));
    kept.extend_from_slice(&items[..prefix_end]);
    kept.extend_from_slice(&items[suffix_start..]);

    let (messages, total_tokens) = project(&kept);
    FilteredContext {
        items: kept,
        messages,
        total_tokens,
        middle_out_applied: true,
    }
}

/// Picks a filter for the current log: middle-out once the log exceeds
/// `cap`, identity projection otherwise (spec.md §4.F BUILD CALL).
pub fn filter_for(items: &[Message], cap: u64) -> FilteredContext {
    let total: i64 = items.iter().map(|m| m.token_count).sum();
    if (total.max(0) as u64) > cap {
        middle_out_filtering(items, cap)
    } else {
        no_op_filtering(items)
    }
}

/// Indices (into `messages`) of the "first" and "second" cache-point slots
/// (spec.md §4.E "Cache-point placement"). `secondCachePoint` is always the
/// last message; `firstCachePoint` is the item three-from-the-end when the
/// log is long enough (the previous user/toolResult boundary, so the cache
/// point survives one tool round trip), otherwise it collapses to the same
/// slot as the second. After middle-out, both collapse to the last message.
///
/// Because a tool round trip appends exactly two items (`toolUse`,
/// `toolResult`) between calls, `len-3` at this call equals `len-1` (the
/// second slot) at the previous call — this is precisely the "advance to
/// the previous second slot" sliding behavior spec.md describes, expressed
/// as a pure function of the current length rather than carried state.
pub fn cache_point_indices(len: usize, middle_out_applied: bool) -> (Option<usize>, Option<usize>) {
    if len == 0 {
        return (None, None);
    }
    let second = len - 1;
    let first = if middle_out_applied || len <= 2 {
        second
    } else {
        len - 3
    };
    (Some(first), Some(second))
}

/// Inserts trailing `CachePoint` markers into `messages` at the given
/// indices (deduplicated, since the two slots may coincide).
pub fn apply_cache_points(
    messages: &mut [LlmMessage],
    first: Option<usize>,
    second: Option<usize>,
) {
    let mut indices: Vec<usize> = [first, second].into_iter().flatten().collect();
    indices.sort_unstable();
    indices.dedup();
    for idx in indices {
        if let Some(message) = messages.get_mut(idx) {
            message.content.push(ContentBlock::CachePoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swe_core::Role;

    fn msg(role: Role, message_type: MessageType, tokens: i64) -> Message {
        Message {
            seq: 0,
            role,
            message_type,
            content: vec![ContentBlock::text("x")],
            token_count: tokens,
            model_override: None,
            thinking_budget: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn no_op_below_cap_keeps_everything() {
        let items = vec![
            msg(Role::User, MessageType::UserMessage, 10),
            msg(Role::Assistant, MessageType::AssistantResponse, 20),
        ];
        let ctx = filter_for(&items, DEFAULT_TOKEN_CAP);
        assert_eq!(ctx.items.len(), 2);
        assert!(!ctx.middle_out_applied);
        assert_eq!(ctx.total_tokens, 30);
    }

    #[test]
    fn middle_out_fits_under_cap_and_keeps_ends() {
        let mut items = Vec::new();
        items.push(msg(Role::User, MessageType::UserMessage, 1000));
        for _ in 0..500 {
            items.push(msg(Role::Assistant, MessageType::AssistantResponse, 1000));
        }
        items.push(msg(Role::Assistant, MessageType::AssistantResponse, 1000));

        let ctx = filter_for(&items, DEFAULT_TOKEN_CAP);
        assert!(ctx.middle_out_applied);
        assert!(ctx.total_tokens <= DEFAULT_TOKEN_CAP);
        assert_eq!(ctx.items.first().unwrap().token_count, 1000);
        assert_eq!(ctx.items.last().unwrap().token_count, 1000);
        assert!(ctx.items.len() < items.len());
    }

    #[test]
    fn middle_out_never_splits_a_tool_pair() {
        let mut items = vec![msg(Role::User, MessageType::UserMessage, 50_000)];
        for _ in 0..50 {
            items.push(msg(Role::Assistant, MessageType::ToolUse, 5_000));
            items.push(msg(Role::User, MessageType::ToolResult, 5_000));
        }
        let ctx = filter_for(&items, 60_000);
        assert!(ctx.middle_out_applied);
        // first retained item after the prefix must not be an orphaned toolResult
        if ctx.items.len() > 1 {
            assert_ne!(ctx.items[1].message_type, MessageType::ToolResult);
        }
    }

    #[test]
    fn cache_points_collapse_after_middle_out() {
        let (first, second) = cache_point_indices(10, true);
        assert_eq!(first, second);
        assert_eq!(second, Some(9));
    }

    #[test]
    fn cache_points_use_len_minus_three_normally() {
        let (first, second) = cache_point_indices(10, false);
        assert_eq!(first, Some(7));
        assert_eq!(second, Some(9));
    }

    #[test]
    fn sliding_window_matches_previous_second_slot() {
        // At length N, "second" is N-1. After one tool round trip (two more
        // items appended), length is N+2, and "first" should equal N-1 —
        // the previous call's "second" index.
        let (_, second_at_n) = cache_point_indices(10, false);
        let (first_at_n_plus_2, _) = cache_point_indices(12, false);
        assert_eq!(second_at_n, first_at_n_plus_2);
    }
}
