//! Agent Turn Loop (spec.md §4.F): ENTRY -> BUILD CALL -> INVOKE -> (DISPATCH
//! TOOLS | FINALIZE), looping back to BUILD CALL after every tool round trip.

use crate::context;
use crate::error::{AgentError, AgentResult};
use crate::system_prompt;
use crate::tools::{McpDispatcher, ToolContext, REQUIRED_TOOL_NAMES};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use swe_core::{
    AgentStatus, BusEvent, ContentBlock, EventBus, Message, MessageType, Role, SessionKey,
    ToolResultStatus,
};
use swe_llm::{ConverseRequest, InferenceConfig, LlmClient, LlmError, StopReason, SystemBlock};
use swe_store::{CostLedger, MessageStore, MetadataStore, Preferences, SessionStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_MAX_TOKENS: u32 = 8192;
const MAX_THROTTLE_RETRIES: u32 = 100;
const MAX_TOKENS_ESCALATIONS: u32 = 5;
const TITLE_MAX_CHARS: usize = 15;

/// Static per-call tuning, distinct from `AgentTurnLoop`'s durable
/// dependencies: model candidate lists and the safety caps spec.md §5/§8
/// describe.
#[derive(Clone, Debug)]
pub struct TurnLoopConfig {
    pub default_candidate_models: Vec<String>,
    pub title_candidate_models: Vec<String>,
    pub context_token_cap: u64,
    /// Safety cap on BUILD-CALL/DISPATCH-TOOLS round trips within one turn,
    /// distinct from the throttle/max-tokens retry counters, which bound
    /// retries of a single INVOKE (teacher's `AgentConfig::max_tool_iterations`).
    pub max_tool_iterations: usize,
}

impl Default for TurnLoopConfig {
    fn default() -> Self {
        Self {
            default_candidate_models: vec!["claude-sonnet-4".to_string()],
            title_candidate_models: vec!["claude-haiku-4".to_string()],
            context_token_cap: context::DEFAULT_TOKEN_CAP,
            max_tool_iterations: 50,
        }
    }
}

pub struct AgentTurnLoop {
    messages: Arc<MessageStore>,
    sessions: Arc<SessionStore>,
    ledger: Arc<CostLedger>,
    metadata: Arc<MetadataStore>,
    preferences: Preferences,
    llm: Arc<LlmClient>,
    tools: Arc<crate::tools::ToolRegistry>,
    mcp: Arc<dyn McpDispatcher>,
    bus: Arc<dyn EventBus>,
    config: TurnLoopConfig,
}

impl AgentTurnLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        messages: Arc<MessageStore>,
        sessions: Arc<SessionStore>,
        ledger: Arc<CostLedger>,
        metadata: Arc<MetadataStore>,
        preferences: Preferences,
        llm: Arc<LlmClient>,
        tools: Arc<crate::tools::ToolRegistry>,
        mcp: Arc<dyn McpDispatcher>,
        bus: Arc<dyn EventBus>,
        config: TurnLoopConfig,
    ) -> Self {
        Self {
            messages,
            sessions,
            ledger,
            metadata,
            preferences,
            llm,
            tools,
            mcp,
            bus,
            config,
        }
    }

    /// `onMessageReceived` trigger (spec.md §6): the session's latest item is
    /// already the fresh `userMessage` that should drive this turn.
    pub async fn on_message_received(
        &self,
        worker_id: &SessionKey,
        cancel: &CancellationToken,
    ) -> AgentResult<()> {
        self.run(worker_id, cancel).await
    }

    /// `resume` trigger (spec.md §4.F "Resume", P9): a no-op unless the last
    /// item is `userMessage` or `toolResult`, so restarting a worker process
    /// never double-runs or drops a turn.
    pub async fn resume(&self, worker_id: &SessionKey, cancel: &CancellationToken) -> AgentResult<()> {
        let history = self.messages.list(worker_id, None, None).await?;
        match history.last() {
            Some(item)
                if matches!(
                    item.message_type,
                    MessageType::UserMessage | MessageType::ToolResult
                ) =>
            {
                self.run(worker_id, cancel).await
            }
            _ => Ok(()),
        }
    }

    async fn run(&self, worker_id: &SessionKey, cancel: &CancellationToken) -> AgentResult<()> {
        // ENTRY
        self.sessions
            .update_status(worker_id, AgentStatus::Working)
            .await?;

        let session_record = self.sessions.get(worker_id).await?;
        let mut needs_title = session_record.map(|r| r.title.is_none()).unwrap_or(true);

        let custom_agent_name = self
            .metadata
            .get_typed::<String>(worker_id, "agentName")
            .await?;
        let custom_agent = custom_agent_name
            .as_deref()
            .and_then(|name| self.preferences.find_custom_agent(name))
            .cloned();

        let mut transcript = String::new();
        let mut iterations: usize = 0;

        loop {
            if cancel.is_cancelled() {
                return self.exit_cancelled(worker_id).await;
            }

            iterations += 1;
            if iterations > self.config.max_tool_iterations {
                return Err(AgentError::MaxIterationsExceeded(
                    self.config.max_tool_iterations,
                ));
            }

            // BUILD CALL
            let history = self.messages.list(worker_id, None, None).await?;
            let persisted_tokens: i64 = history.iter().map(|m| m.token_count).sum();
            let last_user_seq = history.iter().rev().find(|m| m.role == Role::User).map(|m| m.seq);
            if transcript.is_empty() {
                if let Some(latest_user) = history
                    .iter()
                    .rev()
                    .find(|m| m.message_type == MessageType::UserMessage)
                {
                    transcript = visible_text(&latest_user.content);
                }
            }

            let filtered = context::filter_for(&history, self.config.context_token_cap);
            let mut wire_messages = filtered.messages;
            let (first, second) =
                context::cache_point_indices(wire_messages.len(), filtered.middle_out_applied);
            context::apply_cache_points(&mut wire_messages, first, second);

            let candidate_models = custom_agent
                .as_ref()
                .and_then(|a| a.model.clone())
                .map(|m| vec![m])
                .unwrap_or_else(|| self.config.default_candidate_models.clone());

            let tool_names = assemble_tool_names(custom_agent.as_ref());
            let mut tool_specs = self.tools.specs_for(&tool_names);
            tool_specs.extend(self.mcp.tool_specs());
            // spec.md §4.F "Tool catalog assembly": some providers reject an
            // empty tool list, so pass none at all rather than `Some(vec![])`.
            let tools_for_request = if tool_specs.is_empty() {
                Vec::new()
            } else {
                tool_specs
            };

            let prompt = system_prompt::assemble(
                worker_id,
                &self.preferences,
                custom_agent.as_ref(),
                &self.metadata,
            )
            .await;

            let base_request = ConverseRequest {
                model_id: String::new(),
                messages: wire_messages,
                system: vec![SystemBlock {
                    text: prompt,
                    cache_point: true,
                }],
                tools: tools_for_request,
                tool_choice: None,
                inference: InferenceConfig {
                    max_tokens: DEFAULT_MAX_TOKENS,
                    ..Default::default()
                },
                reasoning: None,
            };

            // INVOKE
            let outcome = match self
                .invoke_with_retry(worker_id, &candidate_models, &base_request, cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(AgentError::Core(swe_core::Error::Cancelled)) => {
                    return self.exit_cancelled(worker_id).await;
                }
                Err(e) => return Err(e),
            };

            self.record_usage_best_effort(worker_id, &outcome.model_id, &outcome.response.usage)
                .await;
            self.attribute_token_delta_best_effort(
                worker_id,
                last_user_seq,
                persisted_tokens,
                outcome.response.usage.input_tokens,
            )
            .await;

            if outcome.response.content.is_empty() {
                self.finalize(
                    worker_id,
                    Vec::new(),
                    "Done.".to_string(),
                    &mut transcript,
                    needs_title,
                )
                .await?;
                return Ok(());
            }

            match outcome.response.stop_reason {
                StopReason::ToolUse => {
                    self.dispatch_tools(worker_id, &outcome.response.content, cancel)
                        .await?;
                    // Tool dispatch may have populated `transcript` via
                    // reportProgress; loop back to BUILD CALL.
                    if let Some(last) = self.last_report_text(&outcome.response.content) {
                        transcript.push('\n');
                        transcript.push_str(&last);
                    }
                    continue;
                }
                StopReason::EndTurn | StopReason::StopSequence => {
                    let text = visible_text(&outcome.response.content);
                    self.finalize(
                        worker_id,
                        outcome.response.content,
                        text,
                        &mut transcript,
                        needs_title,
                    )
                    .await?;
                    needs_title = false;
                    return Ok(());
                }
                StopReason::MaxTokens => {
                    // invoke_with_retry never returns a MaxTokens stop reason
                    // (it escalates internally); reaching this would be a
                    // logic error upstream.
                    return Err(AgentError::Core(swe_core::Error::MaxTokensExhausted(
                        MAX_TOKENS_ESCALATIONS as usize,
                    )));
                }
            }
        }
    }

    async fn exit_cancelled(&self, worker_id: &SessionKey) -> AgentResult<()> {
        // Status is deliberately left as `working`, not flipped to
        // `pending`, so a racing resume/message trigger doesn't start a
        // second turn before this one has fully unwound (spec.md §5).
        info!(worker_id = %worker_id, "turn cancelled");
        Err(AgentError::Core(swe_core::Error::Cancelled))
    }

    async fn invoke_with_retry(
        &self,
        worker_id: &SessionKey,
        candidate_models: &[String],
        base_request: &ConverseRequest,
        cancel: &CancellationToken,
    ) -> AgentResult<swe_llm::ConverseOutcome> {
        let mut throttle_attempts: u32 = 0;
        let mut max_tokens_retry_count: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Core(swe_core::Error::Cancelled));
            }

            let request = base_request.clone();
            match self
                .llm
                .converse(
                    worker_id,
                    candidate_models,
                    request,
                    max_tokens_retry_count,
                    Some(cancel),
                )
                .await
            {
                Ok(outcome) if outcome.response.stop_reason == StopReason::MaxTokens => {
                    max_tokens_retry_count += 1;
                    if max_tokens_retry_count > MAX_TOKENS_ESCALATIONS {
                        return Err(AgentError::Core(swe_core::Error::MaxTokensExhausted(
                            MAX_TOKENS_ESCALATIONS as usize,
                        )));
                    }
                    warn!(
                        worker_id = %worker_id,
                        max_tokens_retry_count,
                        "max_tokens stop reason; escalating budget and retrying"
                    );
                    continue;
                }
                Ok(outcome) => return Ok(outcome),
                Err(LlmError::Throttled(msg)) => {
                    throttle_attempts += 1;
                    if throttle_attempts > MAX_THROTTLE_RETRIES {
                        return Err(AgentError::Llm(LlmError::Throttled(msg)));
                    }
                    let backoff_ms = rand::thread_rng().gen_range(1_000..=5_000);
                    warn!(worker_id = %worker_id, throttle_attempts, backoff_ms, "throttled; backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                        _ = cancel.cancelled() => return Err(AgentError::Core(swe_core::Error::Cancelled)),
                    }
                    continue;
                }
                Err(LlmError::Cancelled) => {
                    return Err(AgentError::Core(swe_core::Error::Cancelled));
                }
                Err(other) => return Err(AgentError::Llm(other)),
            }
        }
    }

    /// Tool dispatch (spec.md §4.F "Tool dispatch"): runs every `toolUse`
    /// block sequentially, then persists the `(toolUse, toolResult)` items as
    /// a single atomic pair (invariant P1) and emits the paired events.
    async fn dispatch_tools(
        &self,
        worker_id: &SessionKey,
        content: &[ContentBlock],
        cancel: &CancellationToken,
    ) -> AgentResult<()> {
        let tool_uses: Vec<(String, String, serde_json::Value)> = content
            .iter()
            .filter_map(|b| {
                b.as_tool_use()
                    .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
            })
            .collect();

        let mut result_blocks = Vec::with_capacity(tool_uses.len());
        for (id, name, input) in &tool_uses {
            if cancel.is_cancelled() {
                return Err(AgentError::Core(swe_core::Error::Cancelled));
            }

            let ctx = ToolContext {
                tool_use_id: id,
                worker_id,
                preferences: &self.preferences,
                metadata: &self.metadata,
            };

            let dispatched = match self.mcp.dispatch(name, input.clone(), &ctx).await {
                Ok(Some(output)) => Ok(output),
                Ok(None) => self.tools.call(name, input.clone(), &ctx).await,
                Err(e) => Err(e),
            };

            let (blocks, status) = match dispatched {
                Ok(output) => (output.into_content_blocks(), ToolResultStatus::Success),
                Err(e) => (
                    vec![ContentBlock::text(format!(
                        "Error occurred when using tool {name}: {e}"
                    ))],
                    ToolResultStatus::Error,
                ),
            };

            let is_error = status == ToolResultStatus::Error;
            let _ = self
                .bus
                .publish(
                    worker_id,
                    BusEvent::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    },
                )
                .await;
            let _ = self
                .bus
                .publish(
                    worker_id,
                    BusEvent::ToolResult {
                        id: id.clone(),
                        name: name.clone(),
                        is_error,
                    },
                )
                .await;

            if name == "reportProgress" && !is_error {
                self.record_progress_report(worker_id).await;
            }

            result_blocks.push(ContentBlock::ToolResult {
                id: id.clone(),
                content: blocks,
                status,
            });
        }

        let tool_use_message = Message::tool_use(content.to_vec());
        let tool_result_message = Message::tool_result(result_blocks);
        self.messages
            .append_pair(worker_id, &tool_use_message, &tool_result_message)
            .await?;

        Ok(())
    }

    /// Updates the "last report" timestamp the renderer uses to force a
    /// progress echo if more than 300s have passed since the last one
    /// (spec.md §4.F "Tool dispatch" step 5). Best-effort.
    async fn record_progress_report(&self, worker_id: &SessionKey) {
        if let Err(e) = self
            .metadata
            .set(
                worker_id,
                "lastReportAt",
                serde_json::json!(chrono::Utc::now().to_rfc3339()),
            )
            .await
        {
            warn!(worker_id = %worker_id, error = %e, "failed to record last-report timestamp");
        }
    }

    fn last_report_text(&self, content: &[ContentBlock]) -> Option<String> {
        content
            .iter()
            .find_map(|b| b.as_tool_use())
            .filter(|(_, name, _)| *name == "reportProgress")
            .and_then(|(_, _, input)| input.get("message").and_then(|v| v.as_str()))
            .map(str::to_string)
    }

    /// FINALIZE (spec.md §4.F): persists the final assistant message, emits
    /// the visible reply, flips status back to `pending`, and best-effort
    /// generates a title.
    async fn finalize(
        &self,
        worker_id: &SessionKey,
        content: Vec<ContentBlock>,
        visible: String,
        transcript: &mut String,
        needs_title: bool,
    ) -> AgentResult<()> {
        let message_content = if content.is_empty() {
            vec![ContentBlock::text(visible.clone())]
        } else {
            content
        };
        self.messages
            .append(worker_id, &Message::assistant_response(message_content))
            .await?;

        self.sessions
            .update_status(worker_id, AgentStatus::Pending)
            .await?;

        // Ordering guarantee (spec.md §5 (iii)): per-tool toolUse/toolResult
        // pairs, then an optional sessionTitleUpdate, then the final
        // assistant message — so the title update must publish before this
        // turn's BusEvent::Message.
        if needs_title {
            if !transcript.is_empty() {
                transcript.push('\n');
            }
            transcript.push_str(&visible);
            self.generate_title_best_effort(worker_id, transcript).await;
        }

        let _ = self
            .bus
            .publish(
                worker_id,
                BusEvent::Message {
                    role: "assistant".to_string(),
                    text: visible.clone(),
                },
            )
            .await;

        Ok(())
    }

    async fn record_usage_best_effort(
        &self,
        worker_id: &SessionKey,
        model_id: &str,
        usage: &swe_core::Usage,
    ) {
        if let Err(e) = self.ledger.record_usage(worker_id, model_id, usage).await {
            warn!(worker_id = %worker_id, error = %e, "failed to record ledger usage");
        }
    }

    /// Message Store token-count attribution (spec.md §4.A "Token-count
    /// semantics"): the provider's billed input tokens, minus the sum of
    /// already-persisted per-item `tokenCount`s, is attributed to the last
    /// user-role item — the one that triggered this call. The delta is
    /// negative exactly when normalization (`swe_llm::normalize`) stripped a
    /// stale reasoning block from the wire request before billing, since
    /// that block's tokens were already counted once when first billed
    /// (P3: negative only on a user item).
    async fn attribute_token_delta_best_effort(
        &self,
        worker_id: &SessionKey,
        last_user_seq: Option<u64>,
        persisted_tokens: i64,
        billed_input_tokens: u64,
    ) {
        let Some(seq) = last_user_seq else {
            return;
        };
        let delta = billed_input_tokens as i64 - persisted_tokens;
        if delta == 0 {
            return;
        }
        if let Err(e) = self.messages.update_token_count(worker_id, seq, delta).await {
            warn!(worker_id = %worker_id, error = %e, "failed to attribute token-count delta");
        }
    }

    /// Title generation (spec.md §4.F "Title generation", P10): best-effort,
    /// never surfaces a failure to the caller.
    async fn generate_title_best_effort(&self, worker_id: &SessionKey, transcript: &str) {
        if transcript.trim().is_empty() {
            return;
        }
        match self.generate_title(worker_id, transcript).await {
            Ok(title) => {
                if let Err(e) = self.sessions.update_title(worker_id, title.clone()).await {
                    warn!(worker_id = %worker_id, error = %e, "failed to persist generated title");
                    return;
                }
                let _ = self
                    .bus
                    .publish(
                        worker_id,
                        BusEvent::SessionTitleUpdate { new_title: title },
                    )
                    .await;
            }
            Err(e) => {
                debug!(worker_id = %worker_id, error = %e, "title generation failed, leaving session untitled");
            }
        }
    }

    async fn generate_title(&self, worker_id: &SessionKey, transcript: &str) -> AgentResult<String> {
        let prompt = format!(
            "Summarize this conversation in a title of at most {TITLE_MAX_CHARS} characters. \
             Respond with only the title, no punctuation or quotes.\n\n{transcript}"
        );
        let request = ConverseRequest {
            model_id: String::new(),
            messages: vec![swe_llm::LlmMessage::user(vec![ContentBlock::text(prompt)])],
            system: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
            inference: InferenceConfig {
                max_tokens: 32,
                ..Default::default()
            },
            reasoning: None,
        };
        let outcome = self
            .llm
            .converse(
                worker_id,
                &self.config.title_candidate_models,
                request,
                0,
                None,
            )
            .await?;
        let raw = visible_text(&outcome.response.content);
        let title: String = raw.trim().chars().take(TITLE_MAX_CHARS).collect();
        Ok(title)
    }
}

fn assemble_tool_names(custom_agent: Option<&swe_store::CustomAgent>) -> Vec<String> {
    let mut names: Vec<String> = REQUIRED_TOOL_NAMES.iter().map(|s| s.to_string()).collect();
    if let Some(agent) = custom_agent {
        for name in &agent.allowed_tools {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

fn visible_text(content: &[ContentBlock]) -> String {
    let joined = content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    strip_thinking_tags(&joined)
}

/// FINALIZE (spec.md §4.F): some models emit inline `<thinking>...</thinking>`
/// tags within a text block rather than a structured `reasoning` block; strip
/// those before the text becomes the user-visible reply.
fn strip_thinking_tags(text: &str) -> String {
    const OPEN: &str = "<thinking>";
    const CLOSE: &str = "</thinking>";
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        rest = &rest[start + OPEN.len()..];
        if let Some(end) = rest.find(CLOSE) {
            rest = &rest[end + CLOSE.len()..];
        } else {
            rest = "";
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_required_tools_plus_custom_agent_tools() {
        let agent = swe_store::CustomAgent {
            name: "reviewer".into(),
            system_prompt: "review".into(),
            allowed_tools: vec!["reportProgress".into(), "customLint".into()],
            model: None,
        };
        let names = assemble_tool_names(Some(&agent));
        assert!(names.contains(&"reportProgress".to_string()));
        assert!(names.contains(&"todoInit".to_string()));
        assert!(names.contains(&"customLint".to_string()));
        // no duplicate reportProgress entry
        assert_eq!(names.iter().filter(|n| *n == "reportProgress").count(), 1);
    }

    #[test]
    fn visible_text_excludes_non_text_blocks() {
        let content = vec![
            ContentBlock::text("hello"),
            ContentBlock::ToolUse {
                id: "t1".into(),
                name: "x".into(),
                input: serde_json::json!({}),
            },
            ContentBlock::text("world"),
        ];
        assert_eq!(visible_text(&content), "hello\nworld");
    }

    #[test]
    fn visible_text_strips_inline_thinking_tags() {
        let content = vec![ContentBlock::text(
            "<thinking>let me work through this</thinking>The answer is 4.",
        )];
        assert_eq!(visible_text(&content), "The answer is 4.");
    }

    #[test]
    fn visible_text_strips_multiple_thinking_blocks() {
        let content = vec![ContentBlock::text(
            "<thinking>a</thinking>Hi <thinking>b</thinking>there.",
        )];
        assert_eq!(visible_text(&content), "Hi there.");
    }
}
