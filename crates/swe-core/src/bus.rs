//! Event bus payloads (spec.md §6 "Event bus"). The Agent Turn Loop publishes
//! these as side effects of tool dispatch and title generation; delivery is
//! decoupled behind `EventBus` so the gateway and tests can each supply their
//! own transport.

use crate::types::SessionKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    #[serde(rename = "toolUse")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    #[serde(rename = "toolResult")]
    ToolResult {
        id: String,
        name: String,
        #[serde(rename = "isError")]
        is_error: bool,
    },

    #[serde(rename = "sessionTitleUpdate")]
    SessionTitleUpdate {
        #[serde(rename = "newTitle")]
        new_title: String,
    },

    #[serde(rename = "message")]
    Message { role: String, text: String },
}

/// Publishes turn-loop side effects to whatever is listening on a session's
/// channel. Implementations: an in-process broadcast channel (gateway's own
/// subscribers, tests) or an HTTP POST against `EVENT_HTTP_ENDPOINT`.
#[async_trait::async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, worker_id: &SessionKey, event: BusEvent) -> crate::error::Result<()>;
}
