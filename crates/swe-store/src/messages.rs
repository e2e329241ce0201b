//! Message Store (spec.md §4.A): an append-only, per-session conversation
//! log. Sequence numbers are assigned by an atomic counter item so that
//! concurrent appenders (a turn loop and, e.g., a `resume` retry) never
//! collide on ordering.

use crate::error::Result;
use crate::kv::{Item, KvStore, QuerySpec, WriteOp};
use serde_json::json;
use std::sync::Arc;
use swe_core::{ContentBlock, Message, MessageType, Role, SessionKey};

fn session_pk(key: &SessionKey) -> String {
    format!("SESSION#{}", key.as_str())
}

fn message_sk(seq: u64) -> String {
    format!("MSG#{seq:010}")
}

const SEQ_COUNTER_SK: &str = "MSGSEQ";

pub struct MessageStore {
    kv: Arc<dyn KvStore>,
}

fn message_to_item(pk: &str, seq: u64, message: &Message) -> Result<Item> {
    let item = Item::new(pk, message_sk(seq))
        .set("role", serde_json::to_value(message.role)?)
        .set("messageType", serde_json::to_value(message.message_type)?)
        .set("content", serde_json::to_value(&message.content)?)
        .set("tokenCount", message.token_count)
        .set("createdAt", message.created_at.to_rfc3339());
    let item = match &message.model_override {
        Some(m) => item.set("modelOverride", m.clone()),
        None => item,
    };
    let item = match message.thinking_budget {
        Some(b) => item.set("thinkingBudget", b),
        None => item,
    };
    Ok(item)
}

fn item_to_message(item: &Item) -> Result<(u64, Message)> {
    let seq: u64 = item
        .sk
        .strip_prefix("MSG#")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let role: Role = serde_json::from_value(item.get("role").cloned().unwrap_or(json!("user")))?;
    let message_type: MessageType = serde_json::from_value(
        item.get("messageType")
            .cloned()
            .unwrap_or(json!("userMessage")),
    )?;
    let content: Vec<ContentBlock> =
        serde_json::from_value(item.get("content").cloned().unwrap_or(json!([])))?;
    let token_count = item.get("tokenCount").and_then(|v| v.as_i64()).unwrap_or(0);
    let model_override = item
        .get("modelOverride")
        .and_then(|v| v.as_str())
        .map(String::from);
    let thinking_budget = item
        .get("thinkingBudget")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);
    let created_at = item
        .get("createdAt")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);

    Ok((
        seq,
        Message {
            seq,
            role,
            message_type,
            content,
            token_count,
            model_override,
            thinking_budget,
            created_at,
        },
    ))
}

impl MessageStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    async fn next_seq(&self, session: &SessionKey) -> Result<u64> {
        let seq = self
            .kv
            .increment(&session_pk(session), SEQ_COUNTER_SK, "value", 1)
            .await?;
        Ok(seq as u64)
    }

    /// Appends a single item to the session's history and returns its
    /// assigned sequence number.
    pub async fn append(&self, session: &SessionKey, message: &Message) -> Result<u64> {
        let seq = self.next_seq(session).await?;
        let item = message_to_item(&session_pk(session), seq, message)?;
        self.kv
            .transact_write(vec![WriteOp::PutIfAbsent(item)])
            .await?;
        Ok(seq)
    }

    /// Appends a `toolUse` item and its paired `toolResult` item as a single
    /// atomic unit, so a reader can never observe one without the other
    /// (invariant P1).
    pub async fn append_pair(
        &self,
        session: &SessionKey,
        tool_use: &Message,
        tool_result: &Message,
    ) -> Result<(u64, u64)> {
        let use_seq = self.next_seq(session).await?;
        let result_seq = self.next_seq(session).await?;
        let pk = session_pk(session);
        let use_item = message_to_item(&pk, use_seq, tool_use)?;
        let result_item = message_to_item(&pk, result_seq, tool_result)?;
        self.kv
            .transact_write(vec![
                WriteOp::PutIfAbsent(use_item),
                WriteOp::PutIfAbsent(result_item),
            ])
            .await?;
        Ok((use_seq, result_seq))
    }

    /// Lists items in ascending sequence order, optionally paged.
    pub async fn list(
        &self,
        session: &SessionKey,
        limit: Option<usize>,
        start_after_seq: Option<u64>,
    ) -> Result<Vec<Message>> {
        let spec = QuerySpec {
            sk_prefix: Some("MSG#".to_string()),
            limit,
            start_key: start_after_seq.map(message_sk),
            ascending: true,
        };
        let page = self.kv.query(&session_pk(session), spec).await?;
        page.items
            .iter()
            .map(|i| item_to_message(i).map(|(_, m)| m))
            .collect()
    }

    /// Corrects an item's token count after the exact count is known (e.g.
    /// once a provider response reports usage for the turn that produced it).
    pub async fn update_token_count(
        &self,
        session: &SessionKey,
        seq: u64,
        token_count: i64,
    ) -> Result<()> {
        let pk = session_pk(session);
        let sk = message_sk(seq);
        if let Some(mut item) = self.kv.get_item(&pk, &sk).await? {
            item.attributes.insert("tokenCount".to_string(), token_count.into());
            self.kv.put_item(item).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn append_assigns_increasing_sequence_numbers() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = MessageStore::new(kv);
        let session = SessionKey::new("s1");

        let seq1 = store
            .append(&session, &Message::user_text("hello"))
            .await
            .unwrap();
        let seq2 = store
            .append(&session, &Message::assistant_response(vec![ContentBlock::text("hi")]))
            .await
            .unwrap();
        assert!(seq2 > seq1);

        let messages = store.list(&session, None, None).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn append_pair_is_atomic() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let store = MessageStore::new(kv);
        let session = SessionKey::new("s1");

        let tool_use = Message::tool_use(vec![ContentBlock::ToolUse {
            id: "t1".into(),
            name: "reportProgress".into(),
            input: json!({}),
        }]);
        let tool_result = Message::tool_result(vec![ContentBlock::ToolResult {
            id: "t1".into(),
            content: vec![ContentBlock::text("ok")],
            status: swe_core::ToolResultStatus::Success,
        }]);

        store.append_pair(&session, &tool_use, &tool_result).await.unwrap();
        let messages = store.list(&session, None, None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].tool_use_ids(), vec!["t1"]);
        assert_eq!(messages[1].tool_result_ids(), vec!["t1"]);
    }
}
