//! Fixed table mapping neutral model ids to Anthropic's own model id strings
//! (spec.md §4.D "Provider abstraction" / SPEC_FULL.md §2).

pub fn to_anthropic_model_id(model_id: &str) -> Option<&'static str> {
    match model_id {
        "claude-opus-4" => Some("claude-opus-4-20250514"),
        "claude-sonnet-4" => Some("claude-sonnet-4-20250514"),
        "claude-haiku-4" => Some("claude-haiku-4-20250514"),
        _ => None,
    }
}
