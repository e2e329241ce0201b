//! System prompt assembly (spec.md §4.F "System prompt assembly"): the base
//! prompt comes from the session's custom agent if one is assigned, else a
//! default; preferences and repository metadata are appended as their own
//! sections.

use swe_core::SessionKey;
use swe_store::{CustomAgent, MetadataStore, Preferences};

pub const DEFAULT_AGENT_PROMPT: &str = "You are an autonomous coding agent. \
Work the user's request to completion, narrating progress with the \
reportProgress tool and tracking multi-step work with todoInit/todoUpdate.";

const REPO_KNOWLEDGE_FILE: &str = "AGENTS.md";

/// `repo` metadata record shape (spec.md §3 Metadata); only the field
/// system-prompt assembly cares about.
#[derive(serde::Deserialize)]
struct RepoMetadata {
    #[serde(rename = "repoDirectory")]
    repo_directory: String,
}

/// Assembles the full system prompt for one turn (spec.md §4.F). Reading the
/// repository knowledge file is best-effort: a missing or unreadable file
/// never fails the turn.
pub async fn assemble(
    worker_id: &SessionKey,
    preferences: &Preferences,
    custom_agent: Option<&CustomAgent>,
    metadata: &MetadataStore,
) -> String {
    let mut prompt = custom_agent
        .map(|a| a.system_prompt.clone())
        .unwrap_or_else(|| DEFAULT_AGENT_PROMPT.to_string());

    if let Some(common) = &preferences.common_prompt_suffix {
        if !common.trim().is_empty() {
            prompt.push_str("\n\n## Common Prompt\n");
            prompt.push_str(common);
        }
    }

    if let Ok(Some(repo)) = metadata
        .get_typed::<RepoMetadata>(worker_id, "repo")
        .await
    {
        if let Some(knowledge) = read_repo_knowledge(&repo.repo_directory).await {
            prompt.push_str("\n\n## Repository Knowledge\n");
            prompt.push_str(&knowledge);
        }
    }

    prompt
}

async fn read_repo_knowledge(repo_directory: &str) -> Option<String> {
    let path = std::path::Path::new(repo_directory).join(REPO_KNOWLEDGE_FILE);
    tokio::fs::read_to_string(path).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use swe_store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn falls_back_to_default_prompt() {
        let metadata = MetadataStore::new(Arc::new(MemoryStore::new()));
        let worker_id = SessionKey::new("s1");
        let prompt = assemble(&worker_id, &Preferences::default(), None, &metadata).await;
        assert_eq!(prompt, DEFAULT_AGENT_PROMPT);
    }

    #[tokio::test]
    async fn custom_agent_prompt_overrides_default() {
        let metadata = MetadataStore::new(Arc::new(MemoryStore::new()));
        let worker_id = SessionKey::new("s1");
        let agent = CustomAgent {
            name: "reviewer".into(),
            system_prompt: "Review code carefully.".into(),
            allowed_tools: vec![],
            model: None,
        };
        let prompt = assemble(&worker_id, &Preferences::default(), Some(&agent), &metadata).await;
        assert_eq!(prompt, "Review code carefully.");
    }

    #[tokio::test]
    async fn appends_common_prompt_section() {
        let metadata = MetadataStore::new(Arc::new(MemoryStore::new()));
        let worker_id = SessionKey::new("s1");
        let mut prefs = Preferences::default();
        prefs.common_prompt_suffix = Some("Always write tests.".into());
        let prompt = assemble(&worker_id, &prefs, None, &metadata).await;
        assert!(prompt.contains("## Common Prompt"));
        assert!(prompt.contains("Always write tests."));
    }

    #[tokio::test]
    async fn missing_repo_directory_is_silently_skipped() {
        let metadata = MetadataStore::new(Arc::new(MemoryStore::new()));
        let worker_id = SessionKey::new("s1");
        metadata
            .set(
                &worker_id,
                "repo",
                serde_json::json!({"repoDirectory": "/nonexistent/path"}),
            )
            .await
            .unwrap();
        let prompt = assemble(&worker_id, &Preferences::default(), None, &metadata).await;
        assert!(!prompt.contains("## Repository Knowledge"));
    }
}
