//! `sendImage` — lets the agent attach a base64-encoded image (e.g. a
//! screenshot or rendered diagram) to the transcript as a first-class content
//! block (spec.md §9 "Open Questions" iii: format defaults to `"png"` when
//! the caller omits it, matching `ContentBlock::Image`'s own default).

use super::{invalid_input, ToolContext, ToolHandler, ToolOutput};
use crate::error::AgentResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use swe_core::ContentBlock;

fn default_format() -> String {
    "png".to_string()
}

#[derive(Deserialize)]
struct Input {
    data: String,
    #[serde(default = "default_format")]
    format: String,
    #[serde(default)]
    caption: Option<String>,
}

pub struct SendImageTool;

#[async_trait]
impl ToolHandler for SendImageTool {
    fn name(&self) -> &str {
        "sendImage"
    }

    fn description(&self) -> &str {
        "Attach a base64-encoded image to the conversation, with an optional caption."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "string",
                    "description": "Base64-encoded image bytes."
                },
                "format": {
                    "type": "string",
                    "description": "Image MIME subtype, e.g. \"png\" or \"jpeg\". Defaults to \"png\"."
                },
                "caption": {
                    "type": "string",
                    "description": "Optional text to accompany the image."
                }
            },
            "required": ["data"]
        })
    }

    async fn call(&self, input: Value, _ctx: &ToolContext<'_>) -> AgentResult<ToolOutput> {
        let parsed: Input =
            serde_json::from_value(input).map_err(|e| invalid_input(self.name(), e))?;

        if parsed.data.is_empty() {
            return Err(invalid_input(self.name(), "data must not be empty"));
        }

        let mut blocks = vec![ContentBlock::Image {
            bytes: parsed.data,
            format: parsed.format,
        }];
        if let Some(caption) = parsed.caption {
            blocks.push(ContentBlock::text(caption));
        }

        Ok(ToolOutput::Blocks(blocks))
    }
}
