//! The per-stage controller.

use super::schema::{input_kinds, validate};
use crate::agents::{AgentAdapter, AgentContext};
use crate::cancellation::CancellationToken;
use crate::core::{ControllerState, ProjectRequest, StageKind, StageResult, StageStatus};
use crate::errors::AgentError;
use crate::events::{names, EventSink};
use crate::observability::StageTimer;
use crate::store::ArtifactStore;
use crate::tools::ToolGateway;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Session resources every stage controller works against.
#[derive(Clone)]
pub struct StageEnvironment {
    /// The run being driven.
    pub run_id: Uuid,
    /// The originating request.
    pub request: Arc<ProjectRequest>,
    /// The session's artifact store.
    pub store: Arc<ArtifactStore>,
    /// Session-scoped tool gateway, if tools are configured.
    pub tools: Option<ToolGateway>,
    /// The session cancellation signal.
    pub cancel: Arc<CancellationToken>,
    /// The session event sink.
    pub sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageEnvironment")
            .field("run_id", &self.run_id)
            .field("artifacts", &self.store.len())
            .field("tools", &self.tools.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Drives one stage: builds the agent context, invokes the agent, validates
/// and persists the output.
///
/// Each invocation walks `Pending -> Running -> {Succeeded, FailedRetryable,
/// FailedFatal}`; [`reject`](Self::reject) goes straight from `Pending` to
/// `FailedFatal` for a stage that may not run.
pub struct StageController {
    stage: StageKind,
    agent: Arc<dyn AgentAdapter>,
    state: ControllerState,
    invocations: u32,
}

impl StageController {
    /// Creates a controller for `stage` served by `agent`.
    #[must_use]
    pub fn new(stage: StageKind, agent: Arc<dyn AgentAdapter>) -> Self {
        Self {
            stage,
            agent,
            state: ControllerState::Pending,
            invocations: 0,
        }
    }

    /// The stage this controller owns.
    #[must_use]
    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// State after the most recent invocation.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Number of times the agent was invoked.
    #[must_use]
    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    fn transition(&mut self, next: ControllerState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Records a stage that may not run, e.g. because its budget is spent.
    pub fn reject(&mut self, iteration: u32, reason: &str) -> StageResult {
        self.state = ControllerState::Pending;
        self.transition(ControllerState::FailedFatal);
        warn!(stage = %self.stage, iteration, reason = %reason, "Stage rejected");
        StageResult::new(
            self.stage,
            iteration,
            StageStatus::Failure,
            self.state,
            Utc::now(),
        )
        .with_diagnostics(reason)
    }

    /// Runs attempt `iteration` of the stage.
    pub async fn run(
        &mut self,
        env: &StageEnvironment,
        iteration: u32,
        diagnostics: Vec<String>,
    ) -> StageResult {
        self.state = ControllerState::Pending;
        let started_at = Utc::now();
        let timer = StageTimer::start(self.stage.to_string());

        let inputs = input_kinds(self.stage)
            .iter()
            .filter_map(|kind| env.store.latest_of_kind(*kind))
            .collect();
        let mut ctx = AgentContext::new(
            env.run_id,
            self.stage,
            iteration,
            Arc::clone(&env.request),
            Arc::clone(&env.cancel),
        )
        .with_inputs(inputs)
        .with_diagnostics(diagnostics);
        if let Some(tools) = &env.tools {
            ctx = ctx.with_tools(tools.clone());
        }

        env.sink
            .emit(
                names::STAGE_STARTED,
                Some(json!({
                    "run_id": env.run_id,
                    "stage": self.stage,
                    "iteration": iteration,
                    "inputs": ctx.inputs.iter().map(|a| a.reference().to_string()).collect::<Vec<_>>(),
                })),
            )
            .await;
        info!(run_id = %env.run_id, stage = %self.stage, iteration, "Stage started");

        self.transition(ControllerState::Running);
        self.invocations += 1;

        let result = match self.agent.invoke(&ctx).await {
            Ok(output) => {
                let result = match validate(self.stage, &output.text) {
                    Ok(valid) => {
                        let refs: Vec<_> = valid
                            .artifacts
                            .iter()
                            .map(|(kind, payload)| env.store.put(self.stage, *kind, payload.clone()))
                            .collect();
                        let result = if let Some(failures) = valid.test_failures() {
                            self.transition(ControllerState::FailedRetryable);
                            StageResult::new(
                                self.stage,
                                iteration,
                                StageStatus::Failure,
                                self.state,
                                started_at,
                            )
                            .with_diagnostics(failures)
                        } else {
                            self.transition(ControllerState::Succeeded);
                            StageResult::new(
                                self.stage,
                                iteration,
                                StageStatus::Success,
                                self.state,
                                started_at,
                            )
                        };
                        result.with_artifacts(refs)
                    }
                    Err(err) => {
                        self.transition(ControllerState::FailedRetryable);
                        StageResult::new(
                            self.stage,
                            iteration,
                            StageStatus::NeedsRevision,
                            self.state,
                            started_at,
                        )
                        .with_diagnostics(err.message)
                    }
                };
                result.with_tool_calls(output.tool_calls)
            }
            Err(err) => self
                .agent_failure(iteration, started_at, &err)
                .with_tool_calls(ctx.take_tool_calls()),
        };

        let elapsed_ms = timer.finish();
        let event = if result.is_success() {
            info!(
                run_id = %env.run_id,
                stage = %self.stage,
                iteration,
                elapsed_ms,
                artifacts = result.produced_artifacts.len(),
                "Stage succeeded"
            );
            names::STAGE_COMPLETED
        } else {
            warn!(
                run_id = %env.run_id,
                stage = %self.stage,
                iteration,
                elapsed_ms,
                state = %self.state,
                diagnostics = %result.diagnostics,
                "Stage failed"
            );
            names::STAGE_FAILED
        };
        env.sink
            .emit(
                event,
                Some(json!({
                    "run_id": env.run_id,
                    "stage": self.stage,
                    "iteration": iteration,
                    "state": self.state,
                    "status": result.status,
                    "artifacts": result.produced_artifacts.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "tool_calls": result.tool_calls.len(),
                    "elapsed_ms": elapsed_ms,
                })),
            )
            .await;

        result
    }

    fn agent_failure(
        &mut self,
        iteration: u32,
        started_at: chrono::DateTime<Utc>,
        err: &AgentError,
    ) -> StageResult {
        let (state, status) = match err {
            AgentError::Cancelled(_) => (ControllerState::FailedFatal, StageStatus::Cancelled),
            // Retries already exhausted inside the agent; let the workflow revise.
            AgentError::Transient(_) | AgentError::Timeout { .. } => {
                (ControllerState::FailedRetryable, StageStatus::Failure)
            }
            AgentError::Permanent(_) => (ControllerState::FailedFatal, StageStatus::Failure),
        };
        self.transition(state);
        let diagnostics = match err {
            AgentError::Cancelled(reason) => reason.clone(),
            other => other.to_string(),
        };
        StageResult::new(self.stage, iteration, status, self.state, started_at)
            .with_diagnostics(diagnostics)
    }
}

impl std::fmt::Debug for StageController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageController")
            .field("stage", &self.stage)
            .field("agent", &self.agent.name())
            .field("state", &self.state)
            .field("invocations", &self.invocations)
            .finish()
    }
}
