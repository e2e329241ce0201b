//! Static model capability table (SPEC_FULL.md §2 / spec.md §4.D step 1).
//!
//! `toolChoiceSupport` and `cacheSupport` are genuine subsets, not booleans,
//! mirroring spec.md's `subset of {auto,any,tool}` / `subset of
//! {system,tool,message}` descriptors: normalization (§4.D step 3) drops a
//! `toolChoice` or a cache layer only when the *specific* kind requested
//! isn't in the model's subset, not whenever the model lacks the feature
//! entirely.

use crate::types::ToolChoice;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLayer {
    System,
    Tool,
    Message,
}

#[derive(Clone, Copy, Debug)]
pub struct ModelCapability {
    pub model_id: &'static str,
    pub max_output_tokens: u32,
    pub reasoning_support: bool,
    pub interleaved_thinking_support: bool,
    /// Subset of `{auto, any, tool}` the model accepts for `toolChoice`.
    pub tool_choice_support: &'static [&'static str],
    /// Subset of `{system, tool, message}` layers the model can cache.
    pub cache_support: &'static [CacheLayer],
    pub supported_cri_profiles: &'static [&'static str],
}

impl ModelCapability {
    pub fn supports_tool_choice(&self, choice: &ToolChoice) -> bool {
        let kind = match choice {
            ToolChoice::Auto => "auto",
            ToolChoice::Any => "any",
            ToolChoice::Tool(_) => "tool",
        };
        self.tool_choice_support.contains(&kind)
    }

    pub fn supports_cache(&self, layer: CacheLayer) -> bool {
        self.cache_support.contains(&layer)
    }
}

const ALL_CACHE_LAYERS: &[CacheLayer] =
    &[CacheLayer::System, CacheLayer::Tool, CacheLayer::Message];

pub const CAPABILITY_TABLE: &[ModelCapability] = &[
    ModelCapability {
        model_id: "claude-opus-4",
        max_output_tokens: 32_000,
        reasoning_support: true,
        interleaved_thinking_support: true,
        tool_choice_support: &["auto", "any", "tool"],
        cache_support: ALL_CACHE_LAYERS,
        supported_cri_profiles: &["global", "us", "eu", "apac"],
    },
    ModelCapability {
        model_id: "claude-sonnet-4",
        max_output_tokens: 64_000,
        reasoning_support: true,
        interleaved_thinking_support: true,
        tool_choice_support: &["auto", "any", "tool"],
        cache_support: ALL_CACHE_LAYERS,
        supported_cri_profiles: &["global", "us", "eu", "apac", "jp", "au"],
    },
    ModelCapability {
        model_id: "claude-haiku-4",
        max_output_tokens: 16_000,
        reasoning_support: false,
        interleaved_thinking_support: false,
        tool_choice_support: &["auto", "any", "tool"],
        cache_support: &[CacheLayer::System, CacheLayer::Message],
        supported_cri_profiles: &["global", "us"],
    },
];

pub fn capability_for(model_id: &str) -> Option<&'static ModelCapability> {
    CAPABILITY_TABLE.iter().find(|c| c.model_id == model_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haiku_cannot_cache_tool_layer() {
        let cap = capability_for("claude-haiku-4").unwrap();
        assert!(cap.supports_cache(CacheLayer::System));
        assert!(!cap.supports_cache(CacheLayer::Tool));
    }

    #[test]
    fn unknown_model_has_no_capability() {
        assert!(capability_for("nonexistent-model").is_none());
    }
}
