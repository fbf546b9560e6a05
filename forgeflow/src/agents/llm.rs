//! The completion-backed agent.

use super::{
    retry_transient, role_preamble, sanitize_text, AgentAdapter, AgentContext, AgentOutput,
    ChatMessage, CompletionRequest, CompletionResponse, CompletionService, RetryConfig, ToolCall,
};
use crate::core::ToolCallRecord;
use crate::errors::{AgentError, ToolError};
use crate::observability::StageTimer;
use crate::tools::ToolGateway;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const REPAIR_PROMPT: &str = "Your previous answer was empty. Answer again with the complete \
output in the requested format.";

/// Limits applied to one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Timeout of one completion call in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Repair prompts sent after an empty answer before giving up.
    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: u32,
    /// Rounds of tool calls allowed per invocation.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Normalize answers to ASCII.
    #[serde(default = "default_ascii_only")]
    pub ascii_only: bool,
}

fn default_call_timeout_ms() -> u64 {
    120_000
}

fn default_repair_attempts() -> u32 {
    1
}

fn default_max_tool_rounds() -> u32 {
    4
}

fn default_ascii_only() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            repair_attempts: default_repair_attempts(),
            max_tool_rounds: default_max_tool_rounds(),
            ascii_only: default_ascii_only(),
        }
    }
}

impl AgentConfig {
    /// Sets the completion call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the number of repair prompts.
    #[must_use]
    pub fn with_repair_attempts(mut self, attempts: u32) -> Self {
        self.repair_attempts = attempts;
        self
    }

    /// Sets the number of tool rounds.
    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Enables or disables ASCII normalization.
    #[must_use]
    pub fn with_ascii_only(mut self, ascii_only: bool) -> Self {
        self.ascii_only = ascii_only;
        self
    }

    /// The completion call timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// An agent that answers through a [`CompletionService`].
///
/// Each invocation is a short conversation: the role preamble and the
/// rendered context, then up to `max_tool_rounds` rounds of tool calls, then
/// the final answer. Transient completion failures are retried per
/// [`RetryConfig`]; empty answers get `repair_attempts` repair prompts.
pub struct LlmAgent {
    service: Arc<dyn CompletionService>,
    config: AgentConfig,
    retry: RetryConfig,
    preamble: Option<String>,
    name: String,
}

impl LlmAgent {
    /// Creates an agent with default limits.
    #[must_use]
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            config: AgentConfig::default(),
            retry: RetryConfig::default(),
            preamble: None,
            name: "llm".to_string(),
        }
    }

    /// Sets the invocation limits.
    #[must_use]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the role preamble for every stage.
    #[must_use]
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn complete(
        &self,
        ctx: &AgentContext,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, AgentError> {
        let timeout = self.config.call_timeout();
        let timeout_ms = self.config.call_timeout_ms;
        let key = format!("{}#{}", ctx.stage, ctx.iteration);

        retry_transient(&self.retry, &ctx.cancel, &key, || {
            let service = Arc::clone(&self.service);
            let request = request.clone();
            async move {
                match tokio::time::timeout(timeout, service.complete(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::Timeout { timeout_ms }),
                }
            }
        })
        .await
    }
}

async fn run_tool_call(
    ctx: &AgentContext,
    gateway: &ToolGateway,
    call: &ToolCall,
) -> (ChatMessage, ToolCallRecord) {
    let timer = StageTimer::start(&call.name);

    let result = if ctx.is_cancelled() {
        Err(ToolError::execution_failed(&call.name, "run cancelled"))
    } else {
        match gateway.call(&call.name, call.arguments.clone()).await {
            // A timed-out call gets one more chance.
            Err(err) if err.is_timeout() && !ctx.is_cancelled() => {
                debug!(tool = %call.name, "Retrying timed-out tool call");
                gateway.call(&call.name, call.arguments.clone()).await
            }
            other => other,
        }
    };

    let duration_ms = timer.finish();
    match result {
        Ok(res) => (
            ChatMessage::tool_result(&call.id, res.content),
            ToolCallRecord {
                stage: ctx.stage,
                tool: call.name.clone(),
                call_id: Some(call.id.clone()),
                ok: true,
                error: None,
                duration_ms,
                truncated: res.truncated,
            },
        ),
        Err(err) => {
            let feedback = serde_json::to_string(&err.to_dict()).unwrap_or_else(|_| err.to_string());
            (
                ChatMessage::tool_result(&call.id, feedback),
                ToolCallRecord {
                    stage: ctx.stage,
                    tool: call.name.clone(),
                    call_id: Some(call.id.clone()),
                    ok: false,
                    error: Some(err.to_string()),
                    duration_ms,
                    truncated: false,
                },
            )
        }
    }
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AgentAdapter for LlmAgent {
    async fn invoke(&self, ctx: &AgentContext) -> Result<AgentOutput, AgentError> {
        let preamble = self
            .preamble
            .clone()
            .unwrap_or_else(|| role_preamble(ctx.stage));
        let mut messages = vec![ChatMessage::system(preamble), ChatMessage::user(ctx.render_prompt())];

        let tool_specs: Vec<_> = ctx
            .tools
            .as_ref()
            .map(|gw| gw.definitions().iter().map(|d| d.to_function_spec()).collect())
            .unwrap_or_default();

        let mut rounds = 0;
        let mut repairs = 0;

        loop {
            let offer_tools = !tool_specs.is_empty() && rounds < self.config.max_tool_rounds;
            let mut request = CompletionRequest::new(messages.clone());
            if offer_tools {
                request = request.with_tools(tool_specs.clone());
            }

            let response = self.complete(ctx, request).await?;

            if let (true, Some(gateway)) = (offer_tools && !response.tool_calls.is_empty(), &ctx.tools) {
                rounds += 1;
                debug!(
                    run_id = %ctx.run_id,
                    stage = %ctx.stage,
                    round = rounds,
                    calls = response.tool_calls.len(),
                    "Dispatching tool calls"
                );
                messages.push(ChatMessage::assistant(
                    response.content.unwrap_or_default(),
                    response.tool_calls.clone(),
                ));
                let round = response
                    .tool_calls
                    .iter()
                    .map(|call| run_tool_call(ctx, gateway, call));
                for (message, record) in join_all(round).await {
                    messages.push(message);
                    ctx.record_tool_call(record);
                }
                continue;
            }

            let text = response.content.unwrap_or_default();
            if text.trim().is_empty() {
                if repairs < self.config.repair_attempts {
                    repairs += 1;
                    warn!(stage = %ctx.stage, attempt = repairs, "Empty answer, sending repair prompt");
                    messages.push(ChatMessage::assistant("", Vec::new()));
                    messages.push(ChatMessage::user(REPAIR_PROMPT));
                    continue;
                }
                return Err(AgentError::permanent(format!(
                    "empty answer after {repairs} repair attempt(s)"
                )));
            }

            let text = if self.config.ascii_only {
                sanitize_text(&text)
            } else {
                text
            };
            let records = ctx.tool_calls();
            info!(
                run_id = %ctx.run_id,
                stage = %ctx.stage,
                iteration = ctx.iteration,
                tool_calls = records.len(),
                "Agent answered"
            );
            return Ok(AgentOutput::new(text).with_tool_calls(records));
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
