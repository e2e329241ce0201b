//! Session Store (spec.md §4.B). Each session has a single metadata record
//! plus a denormalized listing entry so `list` can scan across all sessions
//! ordered by recency without a full table scan.

use crate::error::Result;
use crate::kv::{Item, KvStore, QuerySpec, WriteOp};
use serde_json::json;
use std::sync::Arc;
use swe_core::{AgentStatus, SessionKey};

const LISTING_PK: &str = "SESSIONLIST";
const META_SK: &str = "META";

fn session_pk(key: &SessionKey) -> String {
    format!("SESSION#{}", key.as_str())
}

fn listing_sk(key: &SessionKey) -> String {
    format!("SESS#{}", key.as_str())
}

#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub key: SessionKey,
    pub status: AgentStatus,
    pub title: Option<String>,
    /// Soft-delete flag (spec.md §3 Session `isHidden`); `list` filters
    /// these out by default.
    pub is_hidden: bool,
    pub model: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl SessionRecord {
    pub fn new(key: SessionKey) -> Self {
        let now = chrono::Utc::now();
        Self {
            key,
            status: AgentStatus::Pending,
            title: None,
            is_hidden: false,
            model: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn to_item(&self, pk: &str, sk: &str, lsi1: Option<&str>) -> Result<Item> {
        let mut item = Item::new(pk, sk)
            .set("sessionKey", self.key.as_str().to_string())
            .set("status", serde_json::to_value(self.status)?)
            .set("isHidden", self.is_hidden)
            .set("createdAt", self.created_at.to_rfc3339())
            .set("updatedAt", self.updated_at.to_rfc3339());
        if let Some(lsi1) = lsi1 {
            item = item.with_lsi1(lsi1);
        }
        if let Some(title) = &self.title {
            item = item.set("title", title.clone());
        }
        if let Some(model) = &self.model {
            item = item.set("model", model.clone());
        }
        Ok(item)
    }
}

fn item_to_record(item: &Item) -> Result<SessionRecord> {
    let key = SessionKey::new(
        item.get("sessionKey")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    );
    let status: AgentStatus =
        serde_json::from_value(item.get("status").cloned().unwrap_or(json!("pending")))?;
    let is_hidden = item.get("isHidden").and_then(|v| v.as_bool()).unwrap_or(false);
    let title = item.get("title").and_then(|v| v.as_str()).map(String::from);
    let model = item.get("model").and_then(|v| v.as_str()).map(String::from);
    let created_at = parse_ts(item.get("createdAt"));
    let updated_at = parse_ts(item.get("updatedAt"));

    Ok(SessionRecord {
        key,
        status,
        title,
        is_hidden,
        model,
        created_at,
        updated_at,
    })
}

fn parse_ts(value: Option<&serde_json::Value>) -> chrono::DateTime<chrono::Utc> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now)
}

pub struct SessionStore {
    kv: Arc<dyn KvStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    async fn write_both(&self, record: &SessionRecord) -> Result<()> {
        let meta = record.to_item(&session_pk(&record.key), META_SK, None)?;
        let listing = record.to_item(
            LISTING_PK,
            &listing_sk(&record.key),
            Some(&record.updated_at.to_rfc3339()),
        )?;
        self.kv
            .transact_write(vec![WriteOp::Put(meta), WriteOp::Put(listing)])
            .await?;
        Ok(())
    }

    pub async fn create(&self, record: SessionRecord) -> Result<()> {
        self.write_both(&record).await
    }

    pub async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>> {
        match self.kv.get_item(&session_pk(key), META_SK).await? {
            Some(item) => Ok(Some(item_to_record(&item)?)),
            None => Ok(None),
        }
    }

    /// Lists sessions most-recently-updated first, excluding `isHidden=true`
    /// (spec.md §4.B), optionally constrained to an inclusive `[start, end]`
    /// `updatedAt` range.
    ///
    /// `limit=0` (or `None`) means "paginate through everything" (spec.md
    /// §4.B: "Listing paginates when limit=0; otherwise a single query up to
    /// limit"); any other value is a single bounded query.
    pub async fn list(
        &self,
        limit: Option<usize>,
        range: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>,
    ) -> Result<Vec<SessionRecord>> {
        const PAGE_SIZE: usize = 200;

        let items = match limit {
            Some(bounded) if bounded > 0 => {
                let spec = QuerySpec {
                    limit: Some(bounded),
                    ascending: false,
                    ..Default::default()
                };
                self.kv.query_lsi1(LISTING_PK, spec).await?.items
            }
            _ => {
                let mut items = Vec::new();
                let mut start_key = None;
                loop {
                    let spec = QuerySpec {
                        limit: Some(PAGE_SIZE),
                        ascending: false,
                        start_key: start_key.clone(),
                        ..Default::default()
                    };
                    let page = self.kv.query_lsi1(LISTING_PK, spec).await?;
                    let has_more = page.next_start_key.is_some();
                    items.extend(page.items);
                    start_key = page.next_start_key;
                    if !has_more {
                        break;
                    }
                }
                items
            }
        };

        let mut records = items.iter().map(item_to_record).collect::<Result<Vec<_>>>()?;

        records.retain(|r| !r.is_hidden);
        if let Some((start, end)) = range {
            records.retain(|r| r.updated_at >= start && r.updated_at <= end);
        }
        Ok(records)
    }

    async fn mutate(&self, key: &SessionKey, f: impl FnOnce(&mut SessionRecord)) -> Result<()> {
        let mut record = self
            .get(key)
            .await?
            .ok_or_else(|| crate::error::StoreError::NotFound(key.as_str().to_string()))?;
        f(&mut record);
        record.updated_at = chrono::Utc::now();
        self.write_both(&record).await
    }

    pub async fn update_status(&self, key: &SessionKey, status: AgentStatus) -> Result<()> {
        self.mutate(key, |r| r.status = status).await
    }

    pub async fn update_title(&self, key: &SessionKey, title: impl Into<String>) -> Result<()> {
        let title = title.into();
        self.mutate(key, |r| r.title = Some(title)).await
    }

    /// Soft-deletes (or restores) a session by setting `isHidden` (spec.md
    /// §3 Session lifecycle: "terminal state is soft-deleted").
    pub async fn update_visibility(&self, key: &SessionKey, is_hidden: bool) -> Result<()> {
        self.mutate(key, |r| r.is_hidden = is_hidden).await
    }

    pub async fn update_model(&self, key: &SessionKey, model: impl Into<String>) -> Result<()> {
        let model = model.into();
        self.mutate(key, |r| r.model = Some(model)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn create_get_and_update_status() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = SessionStore::new(kv);
        let key = SessionKey::new("s1");

        store.create(SessionRecord::new(key.clone())).await.unwrap();
        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.status, AgentStatus::Pending);

        store.update_status(&key, AgentStatus::Working).await.unwrap();
        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.status, AgentStatus::Working);
    }

    #[tokio::test]
    async fn list_orders_most_recent_first() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = SessionStore::new(kv);

        let a = SessionKey::new("a");
        let b = SessionKey::new("b");
        store.create(SessionRecord::new(a.clone())).await.unwrap();
        store.create(SessionRecord::new(b.clone())).await.unwrap();
        store.update_title(&b, "touched").await.unwrap();

        let sessions = store.list(None, None).await.unwrap();
        assert_eq!(sessions[0].key.as_str(), "b");
    }

    #[tokio::test]
    async fn list_excludes_hidden_sessions() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = SessionStore::new(kv);

        let a = SessionKey::new("a");
        let b = SessionKey::new("b");
        store.create(SessionRecord::new(a.clone())).await.unwrap();
        store.create(SessionRecord::new(b.clone())).await.unwrap();
        store.update_visibility(&a, true).await.unwrap();

        let sessions = store.list(None, None).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].key.as_str(), "b");
    }

    #[tokio::test]
    async fn list_with_limit_zero_paginates_through_everything() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = SessionStore::new(kv);
        for i in 0..5 {
            store
                .create(SessionRecord::new(SessionKey::new(format!("s{i}"))))
                .await
                .unwrap();
        }
        let sessions = store.list(Some(0), None).await.unwrap();
        assert_eq!(sessions.len(), 5);
    }
}
