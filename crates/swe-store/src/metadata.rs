//! Metadata records (spec.md §3): small per-session scratch values set by
//! tools, e.g. `repo -> { repoDirectory }` recorded by a repository-clone
//! tool and later read by system-prompt assembly.

use crate::error::Result;
use crate::kv::{Item, KvStore, QuerySpec};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use swe_core::SessionKey;

fn meta_pk(key: &SessionKey) -> String {
    format!("META#{}", key.as_str())
}

const VALUE_FIELD: &str = "value";

pub struct MetadataStore {
    kv: Arc<dyn KvStore>,
}

impl MetadataStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn set(
        &self,
        session: &SessionKey,
        key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let item = Item::new(meta_pk(session), key).set(VALUE_FIELD, value);
        self.kv.put_item(item).await
    }

    pub async fn get(&self, session: &SessionKey, key: &str) -> Result<Option<serde_json::Value>> {
        let item = self.kv.get_item(&meta_pk(session), key).await?;
        Ok(item.and_then(|i| i.get(VALUE_FIELD).cloned()))
    }

    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        session: &SessionKey,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(session, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// All metadata keys set for a session, e.g. for diagnostics.
    pub async fn list_keys(&self, session: &SessionKey) -> Result<Vec<String>> {
        let page = self
            .kv
            .query(&meta_pk(session), QuerySpec::default())
            .await?;
        Ok(page.items.into_iter().map(|i| i.sk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct RepoMeta {
        repo_directory: String,
    }

    #[tokio::test]
    async fn set_and_get_roundtrip() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = MetadataStore::new(kv);
        let session = SessionKey::new("s1");

        store
            .set(
                &session,
                "repo",
                serde_json::to_value(RepoMeta {
                    repo_directory: "/workspace/repo".into(),
                })
                .unwrap(),
            )
            .await
            .unwrap();

        let got: RepoMeta = store.get_typed(&session, "repo").await.unwrap().unwrap();
        assert_eq!(got.repo_directory, "/workspace/repo");
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = MetadataStore::new(kv);
        let session = SessionKey::new("s1");
        assert!(store.get(&session, "repo").await.unwrap().is_none());
    }
}
