//! The tool gateway: bounded, budgeted access to registered tools.

use super::{ToolDefinition, ToolRegistry, ToolResult};
use crate::core::ProjectRequest;
use crate::errors::ToolError;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::observability::StageTimer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-call limits applied by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolGatewayConfig {
    /// Timeout of one tool call in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Maximum response size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_max_response_bytes() -> usize {
    64 * 1024
}

impl Default for ToolGatewayConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl ToolGatewayConfig {
    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the response size limit.
    #[must_use]
    pub fn with_max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = max;
        self
    }

    /// The per-call timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug)]
struct CallBudget {
    used: AtomicU32,
    limit: u32,
}

/// Mediates every tool call an agent makes.
///
/// A gateway built with [`ToolGateway::new`] is unrestricted. Sessions use
/// [`ToolGateway::for_session`], which applies the request's enabled tool set
/// and a fresh call budget. Clones share the budget.
#[derive(Clone)]
pub struct ToolGateway {
    registry: Arc<ToolRegistry>,
    config: ToolGatewayConfig,
    enabled: Option<BTreeSet<String>>,
    budget: Option<Arc<CallBudget>>,
    sink: Arc<dyn EventSink>,
}

impl ToolGateway {
    /// Creates an unrestricted gateway over a registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: ToolGatewayConfig) -> Self {
        Self {
            registry,
            config,
            enabled: None,
            budget: None,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Derives the view one run session uses.
    #[must_use]
    pub fn for_session(&self, request: &ProjectRequest, sink: Arc<dyn EventSink>) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            enabled: request.options().enabled_tools.clone(),
            budget: Some(Arc::new(CallBudget {
                used: AtomicU32::new(0),
                limit: request.options().max_tool_calls,
            })),
            sink,
        }
    }

    /// The gateway limits.
    #[must_use]
    pub fn config(&self) -> &ToolGatewayConfig {
        &self.config
    }

    /// Returns true if `name` is registered and enabled.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        self.registry.contains(name)
            && self
                .enabled
                .as_ref()
                .map_or(true, |enabled| enabled.contains(name))
    }

    /// Definitions of the tools this gateway may call.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .definitions()
            .into_iter()
            .filter(|d| self.is_available(&d.name))
            .collect()
    }

    /// Calls made so far against the session budget.
    #[must_use]
    pub fn calls_used(&self) -> u32 {
        self.budget
            .as_ref()
            .map_or(0, |b| b.used.load(Ordering::SeqCst))
    }

    /// Calls left in the session budget, `None` when unbudgeted.
    #[must_use]
    pub fn remaining_calls(&self) -> Option<u32> {
        self.budget
            .as_ref()
            .map(|b| b.limit.saturating_sub(b.used.load(Ordering::SeqCst)))
    }

    /// Calls a tool.
    ///
    /// Timeouts are reported as [`ToolError::ToolTimeout`] and never retried
    /// here. Responses over the size limit are truncated.
    pub async fn call(&self, name: &str, args: Value) -> Result<ToolResult, ToolError> {
        let result = self.call_inner(name, args).await;
        match &result {
            Ok(res) => {
                self.sink
                    .emit(
                        names::TOOL_COMPLETED,
                        Some(json!({
                            "tool": name,
                            "duration_ms": res.duration_ms,
                            "truncated": res.truncated,
                        })),
                    )
                    .await;
            }
            Err(err) => {
                warn!(tool = %name, error = %err, "Tool call failed");
                self.sink
                    .emit(names::TOOL_FAILED, Some(json!(err.to_dict())))
                    .await;
            }
        }
        result
    }

    async fn call_inner(&self, name: &str, args: Value) -> Result<ToolResult, ToolError> {
        if !self.is_available(name) {
            return Err(ToolError::unsupported(name));
        }
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::unsupported(name))?;
        tool.definition().check_arguments(&args)?;
        self.reserve(name)?;

        self.sink
            .emit(names::TOOL_INVOKED, Some(json!({ "tool": name })))
            .await;
        debug!(tool = %name, "Calling tool");

        let timer = StageTimer::start(name);
        let value = match tokio::time::timeout(self.config.call_timeout(), tool.call(args)).await {
            Ok(result) => result?,
            Err(_) => return Err(ToolError::timeout(name, self.config.call_timeout_ms)),
        };

        let rendered = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let (content, truncated) = truncate_to(rendered, self.config.max_response_bytes);

        Ok(ToolResult {
            tool: name.to_string(),
            content,
            truncated,
            duration_ms: timer.finish(),
        })
    }

    fn reserve(&self, name: &str) -> Result<(), ToolError> {
        let Some(budget) = &self.budget else {
            return Ok(());
        };
        budget
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < budget.limit).then_some(used + 1)
            })
            .map(|_| ())
            .map_err(|_| ToolError::BudgetExhausted {
                name: name.to_string(),
                limit: budget.limit,
            })
    }
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("tools", &self.registry.names())
            .field("enabled", &self.enabled)
            .field("calls_used", &self.calls_used())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Cuts `content` to at most `max` bytes on a char boundary.
fn truncate_to(mut content: String, max: usize) -> (String, bool) {
    if content.len() <= max {
        return (content, false);
    }
    let mut end = max;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content.truncate(end);
    (content, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RequestOptions;
    use crate::events::CollectingEventSink;
    use crate::testing::{EchoTool, SlowTool};
    use pretty_assertions::assert_eq;

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(
            ToolRegistry::new()
                .with_tool(Arc::new(EchoTool::new("echo")))
                .with_tool(Arc::new(SlowTool::new("slow", Duration::from_millis(200)))),
        )
    }

    fn session(options: RequestOptions, config: ToolGatewayConfig) -> ToolGateway {
        let request = ProjectRequest::with_options("a calculator", options).unwrap();
        ToolGateway::new(registry(), config).for_session(&request, Arc::new(NoOpEventSink))
    }

    #[tokio::test]
    async fn test_call_returns_content() {
        let gateway = ToolGateway::new(registry(), ToolGatewayConfig::default());
        let result = gateway.call("echo", json!({"text": "hello"})).await.unwrap();

        assert_eq!(result.tool, "echo");
        assert_eq!(result.content, "hello");
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_unsupported() {
        let gateway = ToolGateway::new(registry(), ToolGatewayConfig::default());
        let err = gateway.call("shell", json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::unsupported("shell"));
    }

    #[tokio::test]
    async fn test_disabled_tool_is_unsupported() {
        let gateway = session(
            RequestOptions::new().with_enabled_tools(["slow"]),
            ToolGatewayConfig::default(),
        );

        assert!(!gateway.is_available("echo"));
        let err = gateway.call("echo", json!({"text": "x"})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnsupportedTool { .. }));
        assert_eq!(
            gateway.definitions().iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["slow"]
        );
    }

    #[tokio::test]
    async fn test_timeout_not_retried() {
        let gateway = ToolGateway::new(
            registry(),
            ToolGatewayConfig::default().with_call_timeout(Duration::from_millis(20)),
        );

        let err = gateway.call("slow", json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::timeout("slow", 20));
    }

    #[tokio::test]
    async fn test_response_truncated_on_char_boundary() {
        let gateway = ToolGateway::new(
            registry(),
            ToolGatewayConfig::default().with_max_response_bytes(5),
        );

        let result = gateway.call("echo", json!({"text": "abcdé"})).await.unwrap();
        assert!(result.truncated);
        assert_eq!(result.content, "abcd");
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let gateway = session(
            RequestOptions::new().with_max_tool_calls(2),
            ToolGatewayConfig::default(),
        );

        gateway.call("echo", json!({"text": "1"})).await.unwrap();
        gateway.clone().call("echo", json!({"text": "2"})).await.unwrap();
        let err = gateway.call("echo", json!({"text": "3"})).await.unwrap_err();

        assert_eq!(
            err,
            ToolError::BudgetExhausted {
                name: "echo".into(),
                limit: 2
            }
        );
        assert_eq!(gateway.calls_used(), 2);
        assert_eq!(gateway.remaining_calls(), Some(0));
    }

    #[tokio::test]
    async fn test_invalid_arguments_do_not_consume_budget() {
        let gateway = session(
            RequestOptions::new().with_max_tool_calls(1),
            ToolGatewayConfig::default(),
        );

        let err = gateway.call("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert_eq!(gateway.calls_used(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_independent() {
        let gateway = ToolGateway::new(registry(), ToolGatewayConfig::default());
        let calls = (0..8).map(|i| gateway.call("echo", json!({"text": format!("m{i}")})));
        let results = futures::future::join_all(calls).await;

        let contents: Vec<_> = results.into_iter().map(|r| r.unwrap().content).collect();
        assert_eq!(contents, (0..8).map(|i| format!("m{i}")).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let sink = Arc::new(CollectingEventSink::new());
        let request = ProjectRequest::new("a calculator").unwrap();
        let gateway = ToolGateway::new(registry(), ToolGatewayConfig::default())
            .for_session(&request, sink.clone());

        gateway.call("echo", json!({"text": "x"})).await.unwrap();
        let _ = gateway.call("missing", json!({})).await;

        assert_eq!(
            sink.types(),
            vec!["tool.invoked", "tool.completed", "tool.failed"]
        );
    }

    #[test]
    fn test_truncate_to_short_input() {
        assert_eq!(truncate_to("abc".into(), 10), ("abc".to_string(), false));
    }
}
