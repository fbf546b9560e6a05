//! Workflow state and transition rules.

use crate::core::{ControllerState, RunStatus, StageKind, StageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where the workflow is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// A stage is next to run.
    Stage(StageKind),
    /// Review succeeded.
    Done,
    /// Absorbing failure state.
    Aborted,
}

impl WorkflowPhase {
    /// Returns true for `Done` and `Aborted`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "{stage}"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// What the orchestrator does after a stage result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move on to the next phase (a stage or `Done`).
    Advance(WorkflowPhase),
    /// Run `target` again with the carried diagnostics.
    Revise {
        /// The stage to re-run.
        target: StageKind,
        /// Its revision count after this transition.
        revision: u32,
    },
    /// Stop the run.
    Abort {
        /// Terminal run status.
        status: RunStatus,
        /// Why the run stopped.
        reason: String,
        /// A stage that would have run but was refused.
        rejected: Option<StageKind>,
    },
}

/// Mutable workflow bookkeeping, owned by the orchestrator.
///
/// `attempts` counts every invocation of a stage; `revisions` counts the
/// re-runs after the first attempt and never exceeds the per-stage budget.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    current: WorkflowPhase,
    attempts: BTreeMap<StageKind, u32>,
    revisions: BTreeMap<StageKind, u32>,
    total_invocations: u32,
    pending: BTreeMap<StageKind, Vec<String>>,
    history: Vec<StageResult>,
    max_iterations_per_stage: u32,
    max_total_iterations: u32,
}

impl WorkflowState {
    /// Creates the initial state at Requirements.
    #[must_use]
    pub fn new(max_iterations_per_stage: u32, max_total_iterations: u32) -> Self {
        Self {
            current: WorkflowPhase::Stage(StageKind::Requirements),
            attempts: BTreeMap::new(),
            revisions: BTreeMap::new(),
            total_invocations: 0,
            pending: BTreeMap::new(),
            history: Vec::new(),
            max_iterations_per_stage,
            max_total_iterations,
        }
    }

    /// The current phase.
    #[must_use]
    pub fn current(&self) -> WorkflowPhase {
        self.current
    }

    /// Invocations of `stage` so far.
    #[must_use]
    pub fn attempts(&self, stage: StageKind) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }

    /// Revisions of `stage` so far.
    #[must_use]
    pub fn iteration_count(&self, stage: StageKind) -> u32 {
        self.revisions.get(&stage).copied().unwrap_or(0)
    }

    /// Revision counts of every stage that ran.
    #[must_use]
    pub fn iteration_counts(&self) -> BTreeMap<StageKind, u32> {
        self.attempts
            .keys()
            .map(|stage| (*stage, self.iteration_count(*stage)))
            .collect()
    }

    /// Stage invocations across the run.
    #[must_use]
    pub fn total_invocations(&self) -> u32 {
        self.total_invocations
    }

    /// Diagnostics waiting for the next run of `stage`.
    #[must_use]
    pub fn pending_diagnostics(&self, stage: StageKind) -> &[String] {
        self.pending
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every recorded stage result in order.
    #[must_use]
    pub fn history(&self) -> &[StageResult] {
        &self.history
    }

    /// Consumes the state, returning the trace.
    #[must_use]
    pub fn into_history(self) -> Vec<StageResult> {
        self.history
    }

    /// Attempt number the next run of `stage` gets.
    #[must_use]
    pub fn next_attempt(&self, stage: StageKind) -> u32 {
        self.attempts(stage) + 1
    }

    /// Returns true if another stage invocation fits the run budget.
    #[must_use]
    pub fn has_run_budget(&self) -> bool {
        self.total_invocations < self.max_total_iterations
    }

    /// Records an entry that did not invoke an agent: a rejection or a
    /// cancellation marker.
    pub fn record_marker(&mut self, result: StageResult) {
        self.history.push(result);
    }

    /// Moves to `Aborted`.
    pub fn abort(&mut self) {
        self.current = WorkflowPhase::Aborted;
    }

    /// Records a stage invocation and decides the next transition.
    pub fn apply(&mut self, result: StageResult) -> Transition {
        let stage = result.stage;
        *self.attempts.entry(stage).or_insert(0) += 1;
        self.total_invocations += 1;

        let transition = match result.state {
            ControllerState::Succeeded => {
                self.pending.remove(&stage);
                let next = stage
                    .next()
                    .map_or(WorkflowPhase::Done, WorkflowPhase::Stage);
                Transition::Advance(next)
            }
            ControllerState::FailedRetryable => {
                // Failing tests are fixed by Implementation, not by re-testing.
                let target = if stage == StageKind::Testing {
                    StageKind::Implementation
                } else {
                    stage
                };
                self.revise(target, stage, &result.diagnostics)
            }
            ControllerState::FailedFatal | ControllerState::Pending | ControllerState::Running => {
                Transition::Abort {
                    status: RunStatus::Aborted,
                    reason: format!("{stage} failed: {}", result.diagnostics),
                    rejected: None,
                }
            }
        };

        self.history.push(result);
        self.current = match &transition {
            Transition::Advance(phase) => *phase,
            Transition::Revise { target, .. } => WorkflowPhase::Stage(*target),
            Transition::Abort { .. } => WorkflowPhase::Aborted,
        };
        transition
    }

    fn revise(&mut self, target: StageKind, failed: StageKind, diagnostics: &str) -> Transition {
        if self.max_iterations_per_stage == 0 {
            return Transition::Abort {
                status: RunStatus::Aborted,
                reason: format!("{failed} needs revision but revisions are disabled"),
                rejected: None,
            };
        }
        let used = self.iteration_count(target);
        if used >= self.max_iterations_per_stage {
            return Transition::Abort {
                status: RunStatus::BudgetExceeded,
                reason: format!(
                    "{target} used all {} revisions; last failure: {diagnostics}",
                    self.max_iterations_per_stage
                ),
                rejected: Some(target),
            };
        }

        let revision = used + 1;
        self.revisions.insert(target, revision);
        if !diagnostics.is_empty() {
            self.pending
                .entry(target)
                .or_default()
                .push(diagnostics.to_string());
        }
        Transition::Revise { target, revision }
    }
}
