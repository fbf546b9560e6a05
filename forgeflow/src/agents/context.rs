//! Per-invocation agent context and output.

use crate::cancellation::CancellationToken;
use crate::core::{Artifact, ArtifactKind, ProjectRequest, StageKind, ToolCallRecord};
use crate::tools::ToolGateway;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::Arc;
use uuid::Uuid;

/// Everything an agent sees for one invocation.
///
/// Built fresh by the stage controller from the store and the workflow
/// state; agents keep no conversation state between invocations.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// The run this invocation belongs to.
    pub run_id: Uuid,
    /// The stage (and therefore role) being served.
    pub stage: StageKind,
    /// 1-based attempt number of the stage.
    pub iteration: u32,
    /// The originating request.
    pub request: Arc<ProjectRequest>,
    /// Latest artifacts this stage consumes, in canonical kind order.
    pub inputs: Vec<Arc<Artifact>>,
    /// Failures carried over from earlier attempts.
    pub diagnostics: Vec<String>,
    /// Session-scoped tool access, if tools are configured.
    pub tools: Option<ToolGateway>,
    /// The session cancellation signal.
    pub cancel: Arc<CancellationToken>,
    /// Tool calls made so far in this invocation; outlives a failed invoke.
    tool_log: Arc<Mutex<Vec<ToolCallRecord>>>,
}

impl AgentContext {
    /// Creates a context with no inputs, diagnostics or tools.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        stage: StageKind,
        iteration: u32,
        request: Arc<ProjectRequest>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            run_id,
            stage,
            iteration,
            request,
            inputs: Vec::new(),
            diagnostics: Vec::new(),
            tools: None,
            cancel,
            tool_log: Arc::default(),
        }
    }

    /// Sets the input artifacts.
    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<Arc<Artifact>>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Sets the carried-over diagnostics.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Attaches a tool gateway.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolGateway) -> Self {
        self.tools = Some(tools);
        self
    }

    /// The input artifact of `kind`, if provided.
    #[must_use]
    pub fn input(&self, kind: ArtifactKind) -> Option<&Arc<Artifact>> {
        self.inputs.iter().find(|a| a.kind == kind)
    }

    /// Logs a tool call against this invocation.
    pub fn record_tool_call(&self, record: ToolCallRecord) {
        self.tool_log.lock().push(record);
    }

    /// Tool calls logged so far.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<ToolCallRecord> {
        self.tool_log.lock().clone()
    }

    /// Drains the logged tool calls.
    pub fn take_tool_calls(&self) -> Vec<ToolCallRecord> {
        std::mem::take(&mut *self.tool_log.lock())
    }

    /// Returns true if the session was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Renders the user message for a text completion.
    #[must_use]
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "# Project request\n\n{}", self.request.description());

        let hints = &self.request.options().language_hints;
        if !hints.is_empty() {
            let _ = writeln!(prompt, "\nTarget languages and frameworks: {}", hints.join(", "));
        }

        for artifact in &self.inputs {
            let _ = writeln!(
                prompt,
                "\n# {} (iteration {})\n\n{}",
                artifact.kind,
                artifact.iteration,
                artifact.payload.render()
            );
        }

        if !self.diagnostics.is_empty() {
            let _ = writeln!(prompt, "\n# Problems to fix from the previous attempt\n");
            for diagnostic in &self.diagnostics {
                let _ = writeln!(prompt, "- {diagnostic}");
            }
        }

        let _ = write!(
            prompt,
            "\nProduce the {} output for attempt {}.",
            self.stage, self.iteration
        );
        prompt
    }
}

/// What an agent returns for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOutput {
    /// The final text answer.
    pub text: String,
    /// Tool calls made while producing it.
    pub tool_calls: Vec<ToolCallRecord>,
}

impl AgentOutput {
    /// Creates an output with no tool calls.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Sets the tool call records.
    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = calls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Payload, RequestOptions};
    use crate::store::ArtifactStore;

    fn context() -> AgentContext {
        let request = ProjectRequest::with_options(
            "A todo API",
            RequestOptions::new()
                .with_language_hint("Python")
                .with_language_hint("FastAPI"),
        )
        .unwrap();
        AgentContext::new(
            Uuid::new_v4(),
            StageKind::Architecture,
            2,
            Arc::new(request),
            Arc::new(CancellationToken::new()),
        )
    }

    #[test]
    fn test_render_prompt_sections() {
        let store = ArtifactStore::new();
        let reference = store.put(
            StageKind::Requirements,
            ArtifactKind::RequirementsSpec,
            Payload::text("- CRUD for todos"),
        );
        let spec = store.get(&reference).unwrap();

        let ctx = context()
            .with_inputs(vec![spec])
            .with_diagnostics(vec!["no modules listed".into()]);
        let prompt = ctx.render_prompt();

        assert!(prompt.contains("A todo API"));
        assert!(prompt.contains("Python, FastAPI"));
        assert!(prompt.contains("- CRUD for todos"));
        assert!(prompt.contains("- no modules listed"));
        assert!(prompt.ends_with("Produce the architecture output for attempt 2."));
        assert!(ctx.input(ArtifactKind::RequirementsSpec).is_some());
        assert!(ctx.input(ArtifactKind::SourceFiles).is_none());
    }

    #[test]
    fn test_tool_log_shared_by_clones() {
        let ctx = context();
        let handle = ctx.clone();
        handle.record_tool_call(ToolCallRecord {
            stage: StageKind::Architecture,
            tool: "web_search".into(),
            call_id: None,
            ok: true,
            error: None,
            duration_ms: 3,
            truncated: false,
        });

        assert_eq!(ctx.tool_calls().len(), 1);
        assert_eq!(ctx.take_tool_calls()[0].tool, "web_search");
        assert!(handle.tool_calls().is_empty());
    }

    #[test]
    fn test_cancellation_visible() {
        let ctx = context();
        assert!(!ctx.is_cancelled());
        ctx.cancel.cancel("stop");
        assert!(ctx.is_cancelled());
    }
}
