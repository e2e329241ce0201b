//! `reportProgress` — the one required tool every agent can always call to
//! narrate what it's doing. The Loop (not the handler) does the special
//! post-effects (transcript entry, last-report timestamp) once the call
//! returns, since those require the turn's transcript accumulator
//! (spec.md §4.F "Tool dispatch" step 5).

use super::{invalid_input, ToolContext, ToolHandler, ToolOutput};
use crate::error::AgentResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct Input {
    message: String,
}

pub struct ReportProgressTool;

#[async_trait]
impl ToolHandler for ReportProgressTool {
    fn name(&self) -> &str {
        "reportProgress"
    }

    fn description(&self) -> &str {
        "Report a short, human-readable status update on what you're doing right now."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "A short progress update, written for the person who asked for this work."
                }
            },
            "required": ["message"]
        })
    }

    async fn call(&self, input: Value, _ctx: &ToolContext<'_>) -> AgentResult<ToolOutput> {
        let parsed: Input =
            serde_json::from_value(input).map_err(|e| invalid_input(self.name(), e))?;
        Ok(ToolOutput::text(parsed.message))
    }
}
