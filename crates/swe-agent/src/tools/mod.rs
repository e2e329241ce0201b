//! Tool invocation contract (spec.md §6 "Tool handler contract") and the
//! catalog of built-in handlers. A handler receives validated input and a
//! small per-call context, and returns either a single text block or a list
//! of content blocks.

pub mod report_progress;
pub mod send_image;
pub mod todo;

use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use swe_core::{ContentBlock, SessionKey};
use swe_store::{MetadataStore, Preferences};

/// Per-call context passed to every tool handler (spec.md §6).
pub struct ToolContext<'a> {
    pub tool_use_id: &'a str,
    pub worker_id: &'a SessionKey,
    pub preferences: &'a Preferences,
    pub metadata: &'a MetadataStore,
}

/// A tool handler's result: either a single string (stored as one text
/// block) or a structured list of content blocks (spec.md §4.F "Tool
/// dispatch" step 3).
pub enum ToolOutput {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        ToolOutput::Text(s.into())
    }

    pub fn into_content_blocks(self) -> Vec<ContentBlock> {
        match self {
            ToolOutput::Text(s) => vec![ContentBlock::text(s)],
            ToolOutput::Blocks(blocks) => blocks,
        }
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> serde_json::Value;

    async fn call(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> AgentResult<ToolOutput>;

    fn tool_spec(&self) -> swe_llm::ToolSpec {
        swe_llm::ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.schema(),
            cache_point: false,
        }
    }
}

/// The four tools every agent must be able to call regardless of its
/// custom-agent definition (spec.md §4.F "Tool catalog assembly").
pub const REQUIRED_TOOL_NAMES: &[&str] =
    &["reportProgress", "todoInit", "todoUpdate", "sendImage"];

#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with just the required built-in tools registered
    /// (spec.md §4.F); other named tools (bash, file edit, repo clone) are
    /// out of scope per spec.md §1 and are not registered here.
    pub fn with_required_tools() -> Self {
        let mut registry = Self::new();
        registry.register(report_progress::ReportProgressTool);
        registry.register(todo::TodoInitTool);
        registry.register(todo::TodoUpdateTool);
        registry.register(send_image::SendImageTool);
        registry
    }

    pub fn register(&mut self, handler: impl ToolHandler + 'static) {
        self.handlers.insert(handler.name().to_string(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Tool specs for exactly the named tools that exist in this registry,
    /// in catalog-assembly order (spec.md §4.F).
    pub fn specs_for(&self, names: &[String]) -> Vec<swe_llm::ToolSpec> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .map(|h| h.tool_spec())
            .collect()
    }

    pub async fn call(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> AgentResult<ToolOutput> {
        let handler = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        handler.call(input, ctx).await
    }
}

/// Converts a schema-validation failure into the `InvalidToolInput` error
/// category (spec.md §7.3): caught by the Loop and turned into a textual
/// tool result, never fatal.
pub fn invalid_input(name: &str, message: impl std::fmt::Display) -> AgentError {
    AgentError::Core(swe_core::Error::InvalidToolInput {
        name: name.to_string(),
        message: message.to_string(),
    })
}

/// MCP dispatch seam (spec.md §4.F "Tool dispatch" step 1): tried before the
/// built-in catalog for every tool-use block. Implementations report
/// `Ok(None)` when the tool name isn't served by any configured MCP server.
#[async_trait]
pub trait McpDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> AgentResult<Option<ToolOutput>>;

    /// Tool specs this dispatcher's MCP servers expose, appended to the
    /// catalog assembled from the built-in registry (spec.md §4.F).
    fn tool_specs(&self) -> Vec<swe_llm::ToolSpec> {
        Vec::new()
    }
}

/// No MCP servers configured; every dispatch falls through to the built-in
/// catalog. The natural default when no MCP transport is wired up (spec.md
/// §1 notes MCP client transport itself is out of scope).
pub struct NoopMcpDispatcher;

#[async_trait]
impl McpDispatcher for NoopMcpDispatcher {
    async fn dispatch(
        &self,
        _name: &str,
        _input: serde_json::Value,
        _ctx: &ToolContext<'_>,
    ) -> AgentResult<Option<ToolOutput>> {
        Ok(None)
    }
}
