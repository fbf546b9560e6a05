//! One project generation request, from start to outcome.

use crate::agents::AgentRegistry;
use crate::cancellation::CancellationToken;
use crate::core::{ProjectRequest, RunOutcome};
use crate::errors::ConfigError;
use crate::events::{EventSink, NoOpEventSink};
use crate::orchestrator::Orchestrator;
use crate::stages::StageEnvironment;
use crate::store::ArtifactStore;
use crate::tools::ToolGateway;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Builds a [`RunSession`].
pub struct SessionBuilder {
    request: ProjectRequest,
    agents: AgentRegistry,
    tools: Option<ToolGateway>,
    sink: Arc<dyn EventSink>,
    run_id: Option<Uuid>,
}

impl SessionBuilder {
    /// Gives agents tool access. The session derives its own budgeted view.
    #[must_use]
    pub fn with_tools(mut self, gateway: ToolGateway) -> Self {
        self.tools = Some(gateway);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Uses a fixed run id instead of a fresh one.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Validates the agent registry and creates the session.
    pub fn build(self) -> Result<RunSession, ConfigError> {
        self.agents.validate()?;

        let run_id = self.run_id.unwrap_or_else(Uuid::now_v7);
        let request = Arc::new(self.request);
        let env = StageEnvironment {
            run_id,
            tools: self
                .tools
                .map(|gateway| gateway.for_session(&request, Arc::clone(&self.sink))),
            request,
            store: Arc::new(ArtifactStore::new()),
            cancel: Arc::new(CancellationToken::new()),
            sink: self.sink,
        };
        let orchestrator = Orchestrator::new(env.clone(), &self.agents)?;

        Ok(RunSession { env, orchestrator })
    }
}

/// A single run: owns its store, workflow state, tool budget and
/// cancellation signal. Sessions share no mutable state with each other.
pub struct RunSession {
    env: StageEnvironment,
    orchestrator: Orchestrator,
}

impl RunSession {
    /// Starts building a session.
    #[must_use]
    pub fn builder(request: ProjectRequest, agents: AgentRegistry) -> SessionBuilder {
        SessionBuilder {
            request,
            agents,
            tools: None,
            sink: Arc::new(NoOpEventSink),
            run_id: None,
        }
    }

    /// Creates a session without tools or events.
    pub fn new(request: ProjectRequest, agents: AgentRegistry) -> Result<Self, ConfigError> {
        Self::builder(request, agents).build()
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.env.run_id
    }

    /// The request being served.
    #[must_use]
    pub fn request(&self) -> &ProjectRequest {
        &self.env.request
    }

    /// The session's artifact store, readable during and after the run.
    #[must_use]
    pub fn store(&self) -> Arc<ArtifactStore> {
        Arc::clone(&self.env.store)
    }

    /// Handle for cancelling the run from another task.
    #[must_use]
    pub fn cancellation_handle(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.env.cancel)
    }

    /// Runs the workflow. Every ending, including cancellation and budget
    /// exhaustion, is reported through the returned outcome.
    pub async fn run(self) -> RunOutcome {
        let span = tracing::info_span!("run", run_id = %self.env.run_id);
        self.orchestrator.run().instrument(span).await
    }
}

impl std::fmt::Debug for RunSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSession")
            .field("env", &self.env)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RequestOptions, RunStatus, StageKind};
    use crate::errors::ConfigError;
    use crate::events::{names, CollectingEventSink};
    use crate::testing::{fixtures, EchoTool, ScriptedAgent};
    use crate::tools::{ToolGatewayConfig, ToolRegistry};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_happy_path() {
        let sink = Arc::new(CollectingEventSink::new());
        let session = RunSession::builder(fixtures::calculator_request(), fixtures::scripted_registry())
            .with_event_sink(sink.clone())
            .build()
            .unwrap();
        let store = session.store();
        let run_id = session.run_id();

        let outcome = session.run().await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.run_id, run_id);
        assert_eq!(outcome.stage_sequence(), StageKind::ALL.to_vec());
        assert!(!store.is_empty());
        assert_eq!(sink.types().first().map(String::as_str), Some(names::RUN_STARTED));
        assert_eq!(sink.types().last().map(String::as_str), Some(names::RUN_COMPLETED));
    }

    #[test]
    fn test_missing_agent_rejected_at_start() {
        let agents = AgentRegistry::new()
            .with_agent(StageKind::Requirements, Arc::new(ScriptedAgent::new()));
        let err = RunSession::new(fixtures::calculator_request(), agents).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAgent(StageKind::Architecture)));
    }

    #[tokio::test]
    async fn test_session_gets_own_tool_budget() {
        let registry = Arc::new(ToolRegistry::new().with_tool(Arc::new(EchoTool::new("echo"))));
        let gateway = ToolGateway::new(registry, ToolGatewayConfig::default());
        let request = ProjectRequest::with_options(
            "A CLI calculator",
            RequestOptions::new().with_max_tool_calls(7),
        )
        .unwrap();

        let session = RunSession::builder(request, fixtures::scripted_registry())
            .with_tools(gateway.clone())
            .build()
            .unwrap();

        assert_eq!(session.env.tools.as_ref().unwrap().remaining_calls(), Some(7));
        assert_eq!(gateway.remaining_calls(), None);
    }

    #[tokio::test]
    async fn test_fixed_run_id() {
        let id = Uuid::new_v4();
        let session = RunSession::builder(fixtures::calculator_request(), fixtures::scripted_registry())
            .with_run_id(id)
            .build()
            .unwrap();
        assert_eq!(session.run_id(), id);
        assert_eq!(session.run().await.run_id, id);
    }
}
