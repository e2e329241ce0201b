//! Preferences and custom-agent definitions (SPEC_FULL.md §2). spec.md §3
//! requires these to shape system-prompt and tool-catalog assembly but does
//! not specify a storage format, so this loads a JSON file at startup — the
//! natural Rust stand-in for whatever external preferences store a
//! production deployment would use.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAgent {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub common_prompt_suffix: Option<String>,
    #[serde(default)]
    pub custom_agents: Vec<CustomAgent>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_model: None,
            common_prompt_suffix: None,
            custom_agents: Vec::new(),
        }
    }
}

impl Preferences {
    pub async fn load(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| crate::error::StoreError::Backend(e.to_string()))?;
        let prefs: Preferences = serde_json::from_slice(&bytes)?;
        Ok(prefs)
    }

    pub fn find_custom_agent(&self, name: &str) -> Option<&CustomAgent> {
        self.custom_agents.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let prefs = Preferences::default();
        assert!(prefs.default_model.is_none());
        assert!(prefs.custom_agents.is_empty());
    }

    #[test]
    fn deserializes_custom_agents() {
        let json = r#"{
            "defaultModel": "claude-sonnet-4",
            "customAgents": [
                {"name": "reviewer", "systemPrompt": "review code", "allowedTools": ["reportProgress"]}
            ]
        }"#;
        let prefs: Preferences = serde_json::from_str(json).unwrap();
        assert_eq!(prefs.default_model.as_deref(), Some("claude-sonnet-4"));
        assert_eq!(prefs.custom_agents[0].name, "reviewer");
        assert_eq!(prefs.custom_agents[0].allowed_tools, vec!["reportProgress"]);
    }
}
