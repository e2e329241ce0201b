//! `todoInit` / `todoUpdate` — the running task-list tools agents use to plan
//! and report multi-step work. Both persist a single `"todos"` metadata
//! record per session (spec.md §3 Metadata, §4.F "Tool dispatch"); `todoInit`
//! replaces the list wholesale, `todoUpdate` patches statuses by id.

use super::{invalid_input, ToolContext, ToolHandler, ToolOutput};
use crate::error::AgentResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const TODOS_KEY: &str = "todos";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodoItem {
    id: String,
    content: String,
    #[serde(default = "pending")]
    status: String,
}

fn pending() -> String {
    "pending".to_string()
}

#[derive(Deserialize)]
struct InitInput {
    todos: Vec<TodoItem>,
}

pub struct TodoInitTool;

#[async_trait]
impl ToolHandler for TodoInitTool {
    fn name(&self) -> &str {
        "todoInit"
    }

    fn description(&self) -> &str {
        "Replace the task list with a fresh set of todo items, each with an id, content, and status."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "content": {"type": "string"},
                            "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]}
                        },
                        "required": ["id", "content"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn call(&self, input: Value, ctx: &ToolContext<'_>) -> AgentResult<ToolOutput> {
        let parsed: InitInput =
            serde_json::from_value(input).map_err(|e| invalid_input(self.name(), e))?;

        ctx.metadata
            .set(
                ctx.worker_id,
                TODOS_KEY,
                serde_json::to_value(&parsed.todos).map_err(|e| invalid_input(self.name(), e))?,
            )
            .await
            .map_err(|e| crate::error::AgentError::Store(e))?;

        Ok(ToolOutput::text(format!(
            "todo list set ({} item(s))",
            parsed.todos.len()
        )))
    }
}

#[derive(Deserialize)]
struct UpdateInput {
    id: String,
    status: String,
}

pub struct TodoUpdateTool;

#[async_trait]
impl ToolHandler for TodoUpdateTool {
    fn name(&self) -> &str {
        "todoUpdate"
    }

    fn description(&self) -> &str {
        "Update the status of a single todo item by id (pending, in_progress, or completed)."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]}
            },
            "required": ["id", "status"]
        })
    }

    async fn call(&self, input: Value, ctx: &ToolContext<'_>) -> AgentResult<ToolOutput> {
        let parsed: UpdateInput =
            serde_json::from_value(input).map_err(|e| invalid_input(self.name(), e))?;

        let mut todos: Vec<TodoItem> = ctx
            .metadata
            .get_typed(ctx.worker_id, TODOS_KEY)
            .await
            .map_err(|e| crate::error::AgentError::Store(e))?
            .unwrap_or_default();

        let found = todos.iter_mut().find(|t| t.id == parsed.id);
        match found {
            Some(item) => item.status = parsed.status.clone(),
            None => return Err(invalid_input(self.name(), format!("no todo with id {}", parsed.id))),
        }

        ctx.metadata
            .set(
                ctx.worker_id,
                TODOS_KEY,
                serde_json::to_value(&todos).map_err(|e| invalid_input(self.name(), e))?,
            )
            .await
            .map_err(|e| crate::error::AgentError::Store(e))?;

        Ok(ToolOutput::text(format!(
            "{} -> {}",
            parsed.id, parsed.status
        )))
    }
}
