//! Scripted agents and tools for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::fixtures;
use crate::agents::{AgentAdapter, AgentContext, AgentOutput};
use crate::core::{ArtifactKind, StageKind};
use crate::errors::{AgentError, ToolError};
use crate::tools::{SearchBackend, SearchHit, Tool, ToolDefinition};

type Hook = Arc<dyn Fn(&AgentContext) + Send + Sync>;

/// What an agent saw on one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    /// The stage served.
    pub stage: StageKind,
    /// Attempt number of the stage.
    pub iteration: u32,
    /// Kinds of the input artifacts, in context order.
    pub inputs: Vec<ArtifactKind>,
    /// Diagnostics carried from earlier attempts.
    pub diagnostics: Vec<String>,
}

/// An agent that answers from a per-stage script.
///
/// Scripted answers are consumed in order and the last one repeats. Stages
/// without a script get the canned valid output from [`fixtures`].
pub struct ScriptedAgent {
    name: String,
    scripts: Mutex<HashMap<StageKind, VecDeque<Result<String, AgentError>>>>,
    hooks: HashMap<StageKind, Hook>,
    delay: Option<Duration>,
    invocations: Mutex<Vec<RecordedInvocation>>,
}

impl ScriptedAgent {
    /// Creates an agent answering every stage with its canned output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            scripts: Mutex::new(HashMap::new()),
            hooks: HashMap::new(),
            delay: None,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Sets the adapter name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends an answer to the script of `stage`.
    #[must_use]
    pub fn with_response(self, stage: StageKind, text: impl Into<String>) -> Self {
        self.push(stage, Ok(text.into()));
        self
    }

    /// Appends a failure to the script of `stage`.
    #[must_use]
    pub fn with_error(self, stage: StageKind, error: AgentError) -> Self {
        self.push(stage, Err(error));
        self
    }

    /// Runs `hook` whenever `stage` is invoked, before answering.
    #[must_use]
    pub fn with_hook<F>(mut self, stage: StageKind, hook: F) -> Self
    where
        F: Fn(&AgentContext) + Send + Sync + 'static,
    {
        self.hooks.insert(stage, Arc::new(hook));
        self
    }

    /// Sleeps before every answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every invocation so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().clone()
    }

    /// Invocations of one stage.
    #[must_use]
    pub fn invocation_count(&self, stage: StageKind) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|inv| inv.stage == stage)
            .count()
    }

    fn push(&self, stage: StageKind, answer: Result<String, AgentError>) {
        self.scripts.lock().entry(stage).or_default().push_back(answer);
    }

    fn next_answer(&self, stage: StageKind) -> Result<String, AgentError> {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&stage) {
            Some(script) if script.len() > 1 => script
                .pop_front()
                .unwrap_or_else(|| Ok(fixtures::canned_output(stage).to_string())),
            Some(script) => script
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(fixtures::canned_output(stage).to_string())),
            None => Ok(fixtures::canned_output(stage).to_string()),
        }
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptedAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAgent")
            .field("name", &self.name)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("delay", &self.delay)
            .field("invocations", &self.invocations.lock().len())
            .finish()
    }
}

#[async_trait]
impl AgentAdapter for ScriptedAgent {
    async fn invoke(&self, ctx: &AgentContext) -> Result<AgentOutput, AgentError> {
        self.invocations.lock().push(RecordedInvocation {
            stage: ctx.stage,
            iteration: ctx.iteration,
            inputs: ctx.inputs.iter().map(|a| a.kind).collect(),
            diagnostics: ctx.diagnostics.clone(),
        });

        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled(
                ctx.cancel.reason().unwrap_or_else(|| "cancelled".into()),
            ));
        }
        if let Some(hook) = self.hooks.get(&ctx.stage) {
            hook(ctx);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.next_answer(ctx.stage)
            .map(|text| AgentOutput::new(text).with_tool_calls(ctx.tool_calls()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An agent that always fails with the same error.
#[derive(Debug)]
pub struct FailingAgent {
    error: AgentError,
    calls: Mutex<usize>,
}

impl FailingAgent {
    /// Creates an agent failing with `error`.
    #[must_use]
    pub fn new(error: AgentError) -> Self {
        Self {
            error,
            calls: Mutex::new(0),
        }
    }

    /// Fails with a permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(AgentError::permanent(message))
    }

    /// Fails with a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(AgentError::transient(message))
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl AgentAdapter for FailingAgent {
    async fn invoke(&self, _ctx: &AgentContext) -> Result<AgentOutput, AgentError> {
        *self.calls.lock() += 1;
        Err(self.error.clone())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// A tool that answers with its `text` argument.
#[derive(Debug)]
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    /// Creates the tool under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name)
            .with_description("Echoes its text argument")
            .with_parameters(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"],
            }))
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        match args.get("text").and_then(Value::as_str) {
            Some(text) => Ok(Value::String(text.to_string())),
            None => Err(ToolError::invalid_arguments(&self.name, "'text' must be a string")),
        }
    }
}

/// A tool that sleeps before answering.
#[derive(Debug)]
pub struct SlowTool {
    name: String,
    delay: Duration,
    calls: Mutex<usize>,
}

impl SlowTool {
    /// Creates the tool under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            calls: Mutex::new(0),
        }
    }

    /// Returns the number of calls started.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name).with_description("Answers after a delay")
    }

    async fn call(&self, _args: Value) -> Result<Value, ToolError> {
        *self.calls.lock() += 1;
        tokio::time::sleep(self.delay).await;
        Ok(json!("done"))
    }
}

/// A search backend with fixed hits.
#[derive(Debug)]
pub struct StaticSearchBackend {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearchBackend {
    /// Creates a backend answering every query with `hits`.
    #[must_use]
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchBackend for StaticSearchBackend {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        self.queries.lock().push(query.to_string());
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}
