//! The workflow engine.

use super::{Transition, WorkflowPhase, WorkflowState};
use crate::agents::AgentRegistry;
use crate::core::{FinalArtifacts, RunOutcome, RunStatus, StageKind, StageResult};
use crate::errors::ConfigError;
use crate::events::names;
use crate::stages::{StageController, StageEnvironment};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

const BUDGET_EXHAUSTED: &str = "iteration budget exhausted";

/// Drives the stage controllers through the workflow until a terminal phase.
///
/// `Requirements -> Architecture -> Implementation -> Testing ->
/// {Documentation, Implementation} -> Review -> Done`, or `Aborted`.
pub struct Orchestrator {
    env: StageEnvironment,
    controllers: BTreeMap<StageKind, StageController>,
    state: WorkflowState,
}

impl Orchestrator {
    /// Creates an orchestrator. Fails if a stage has no agent.
    pub fn new(env: StageEnvironment, agents: &AgentRegistry) -> Result<Self, ConfigError> {
        let controllers = StageKind::ALL
            .into_iter()
            .map(|stage| Ok((stage, StageController::new(stage, agents.resolve(stage)?))))
            .collect::<Result<_, ConfigError>>()?;
        let options = env.request.options();
        let state = WorkflowState::new(options.max_iterations_per_stage, options.max_total_iterations);
        Ok(Self {
            env,
            controllers,
            state,
        })
    }

    /// The workflow state.
    #[must_use]
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Runs the workflow to completion. Never fails: every ending is a
    /// [`RunOutcome`].
    pub async fn run(mut self) -> RunOutcome {
        let started_at = Utc::now();
        let run_id = self.env.run_id;
        info!(run_id = %run_id, "Run started");
        self.env
            .sink
            .emit(
                names::RUN_STARTED,
                Some(json!({
                    "run_id": run_id,
                    "max_iterations_per_stage": self.env.request.options().max_iterations_per_stage,
                    "max_total_iterations": self.env.request.options().max_total_iterations,
                })),
            )
            .await;

        loop {
            let stage = match self.state.current() {
                WorkflowPhase::Stage(stage) => stage,
                WorkflowPhase::Done => {
                    return self.finish(started_at, RunStatus::Completed, None, false).await;
                }
                WorkflowPhase::Aborted => {
                    return self
                        .finish(started_at, RunStatus::Aborted, Some("aborted".into()), false)
                        .await;
                }
            };

            if self.env.cancel.is_cancelled() {
                let reason = self.cancel_reason();
                let marker = StageResult::cancelled(stage, self.state.next_attempt(stage), &reason);
                self.state.record_marker(marker);
                self.state.abort();
                return self
                    .finish(started_at, RunStatus::Aborted, Some(reason), true)
                    .await;
            }

            if !self.state.has_run_budget() {
                self.reject(stage);
                self.state.abort();
                let reason = format!(
                    "run used all {} stage invocations",
                    self.env.request.options().max_total_iterations
                );
                return self
                    .finish(started_at, RunStatus::BudgetExceeded, Some(reason), false)
                    .await;
            }

            let iteration = self.state.next_attempt(stage);
            let diagnostics = self.state.pending_diagnostics(stage).to_vec();
            let Some(controller) = self.controllers.get_mut(&stage) else {
                // Unreachable: `new` builds a controller for every stage.
                self.state.abort();
                return self
                    .finish(
                        started_at,
                        RunStatus::Aborted,
                        Some(format!("no controller for {stage}")),
                        false,
                    )
                    .await;
            };
            let result = controller.run(&self.env, iteration, diagnostics).await;

            if result.is_cancelled() {
                let reason = result.diagnostics.clone();
                self.state.record_marker(result);
                self.state.abort();
                return self
                    .finish(started_at, RunStatus::Aborted, Some(reason), true)
                    .await;
            }

            let transition = self.state.apply(result);
            self.emit_transition(stage, &transition).await;

            if let Transition::Abort {
                status,
                reason,
                rejected,
            } = transition
            {
                if let Some(target) = rejected {
                    self.reject(target);
                }
                return self.finish(started_at, status, Some(reason), false).await;
            }
        }
    }

    fn cancel_reason(&self) -> String {
        self.env
            .cancel
            .reason()
            .unwrap_or_else(|| "cancelled".to_string())
    }

    fn reject(&mut self, stage: StageKind) {
        let iteration = self.state.next_attempt(stage);
        if let Some(controller) = self.controllers.get_mut(&stage) {
            let result = controller.reject(iteration, BUDGET_EXHAUSTED);
            self.state.record_marker(result);
        }
    }

    async fn emit_transition(&self, from: StageKind, transition: &Transition) {
        let (to, kind) = match transition {
            Transition::Advance(phase) => (*phase, "advance"),
            Transition::Revise { target, .. } => (WorkflowPhase::Stage(*target), "revise"),
            Transition::Abort { .. } => (WorkflowPhase::Aborted, "abort"),
        };
        info!(run_id = %self.env.run_id, from = %from, to = %to, kind, "Workflow transition");
        self.env
            .sink
            .emit(
                names::WORKFLOW_TRANSITION,
                Some(json!({
                    "run_id": self.env.run_id,
                    "from": from,
                    "to": to.to_string(),
                    "kind": kind,
                })),
            )
            .await;
    }

    async fn finish(
        self,
        started_at: DateTime<Utc>,
        status: RunStatus,
        reason: Option<String>,
        cancelled: bool,
    ) -> RunOutcome {
        let final_artifacts = FinalArtifacts::from_latest(&self.env.store.latest_per_kind());
        let iteration_counts = self.state.iteration_counts();
        let run_id = self.env.run_id;

        let event = match (status, cancelled) {
            (_, true) => {
                warn!(run_id = %run_id, reason = ?reason, "Run cancelled");
                names::RUN_CANCELLED
            }
            (RunStatus::Completed, false) => {
                info!(run_id = %run_id, stages = self.state.history().len(), "Run completed");
                names::RUN_COMPLETED
            }
            (_, false) => {
                error!(run_id = %run_id, status = %status, reason = ?reason, "Run aborted");
                names::RUN_ABORTED
            }
        };
        self.env
            .sink
            .emit(
                event,
                Some(json!({
                    "run_id": run_id,
                    "status": status,
                    "reason": reason,
                    "stages": self.state.history().len(),
                    "artifacts": final_artifacts.kinds(),
                })),
            )
            .await;

        RunOutcome {
            run_id,
            status,
            final_artifacts,
            trace: self.state.into_history(),
            iteration_counts,
            reason,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("env", &self.env)
            .field("phase", &self.state.current())
            .finish_non_exhaustive()
    }
}
