//! OpenAI-compatible chat completions over HTTP.

use super::{
    ChatMessage, ChatRole, CompletionConfig, CompletionRequest, CompletionResponse,
    CompletionService, ToolCall,
};
use crate::errors::{AgentError, ConfigError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Completion client for any OpenAI-compatible endpoint (Groq, OpenAI, vLLM, ...).
///
/// The agent applies the per-call timeout; this client only bounds connects.
#[derive(Debug, Clone)]
pub struct HttpCompletionService {
    client: Client,
    config: CompletionConfig,
}

impl HttpCompletionService {
    /// Creates a client. Fails if no API key is configured.
    pub fn new(config: CompletionConfig) -> Result<Self, ConfigError> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::invalid_value(
                "completion.api_key",
                "an API key is required",
            ));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| ConfigError::invalid_value("completion", e.to_string()))?;
        Ok(Self { client, config })
    }

    /// The client settings.
    #[must_use]
    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    fn build_body(&self, request: &CompletionRequest) -> WireRequest {
        WireRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request.tools.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: ChatRole,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments.
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: Some(msg.content.clone()),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_type(),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<WireMessage> for CompletionResponse {
    fn from(msg: WireMessage) -> Self {
        let tool_calls = msg
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                // Unparseable arguments are passed through as a string so the
                // gateway reports them back to the model as invalid.
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments)),
                id: call.id,
                name: call.function.name,
            })
            .collect();
        Self {
            content: msg.content.filter(|c| !c.is_empty()),
            tool_calls,
        }
    }
}

/// Maps an HTTP status to the agent error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> AgentError {
    let message = format!("completion endpoint returned {status}: {}", truncate(body, 300));
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        AgentError::transient(message)
    } else {
        AgentError::permanent(message)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AgentError> {
        let body = self.build_body(&request);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::transient(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| AgentError::permanent(format!("malformed completion response: {e}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::permanent("completion response has no choices"))?;

        debug!(
            model = %self.config.model,
            tool_calls = choice.message.tool_calls.len(),
            "Completion received"
        );
        Ok(choice.message.into())
    }
}
