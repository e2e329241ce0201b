pub mod context;
pub mod error;
pub mod system_prompt;
pub mod tools;
pub mod turn_loop;

pub use error::{AgentError, AgentResult};
pub use tools::{McpDispatcher, NoopMcpDispatcher, ToolContext, ToolHandler, ToolOutput, ToolRegistry};
pub use turn_loop::{AgentTurnLoop, TurnLoopConfig};
