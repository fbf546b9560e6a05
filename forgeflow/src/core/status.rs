//! Stage kinds and status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One phase of the software generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Turns the free-text request into a requirements document.
    Requirements,
    /// Designs modules, data model and file layout.
    Architecture,
    /// Writes the source files.
    Implementation,
    /// Writes and runs tests, reporting a verdict per test.
    Testing,
    /// Writes user-facing documentation.
    Documentation,
    /// Reviews the whole bundle.
    Review,
}

impl StageKind {
    /// All stages in canonical order.
    pub const ALL: [Self; 6] = [
        Self::Requirements,
        Self::Architecture,
        Self::Implementation,
        Self::Testing,
        Self::Documentation,
        Self::Review,
    ];

    /// The stage that follows this one on success, `None` after Review.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Requirements => Some(Self::Architecture),
            Self::Architecture => Some(Self::Implementation),
            Self::Implementation => Some(Self::Testing),
            Self::Testing => Some(Self::Documentation),
            Self::Documentation => Some(Self::Review),
            Self::Review => None,
        }
    }

    /// Position in the canonical order, starting at 0.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Requirements => 0,
            Self::Architecture => 1,
            Self::Implementation => 2,
            Self::Testing => 3,
            Self::Documentation => 4,
            Self::Review => 5,
        }
    }

    /// Human-readable name of the agent role serving this stage.
    #[must_use]
    pub fn role_name(self) -> &'static str {
        match self {
            Self::Requirements => "requirements analyst",
            Self::Architecture => "software architect",
            Self::Implementation => "software developer",
            Self::Testing => "software tester",
            Self::Documentation => "technical writer",
            Self::Review => "code reviewer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requirements => write!(f, "requirements"),
            Self::Architecture => write!(f, "architecture"),
            Self::Implementation => write!(f, "implementation"),
            Self::Testing => write!(f, "testing"),
            Self::Documentation => write!(f, "documentation"),
            Self::Review => write!(f, "review"),
        }
    }
}

/// Status of one stage invocation as recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Output validated and persisted.
    Success,
    /// The stage failed: failing tests, a permanent agent error or budget exhaustion.
    Failure,
    /// Output violated the stage schema and the stage should be re-run.
    NeedsRevision,
    /// The stage was never started because the run was cancelled.
    Cancelled,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::NeedsRevision => write!(f, "needs_revision"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifecycle of a stage controller during one invocation.
///
/// `Pending -> Running -> {Succeeded, FailedRetryable, FailedFatal}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Not started.
    #[default]
    Pending,
    /// Waiting on the agent.
    Running,
    /// Output validated and persisted.
    Succeeded,
    /// Output rejected or tests failing; the workflow may revise.
    FailedRetryable,
    /// Permanent agent error or exhausted budget; the run aborts.
    FailedFatal,
}

impl ControllerState {
    /// Returns true once the invocation has finished.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedRetryable | Self::FailedFatal
        )
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::FailedFatal)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::FailedRetryable)
                | (Self::Running, Self::FailedFatal)
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::FailedRetryable => write!(f, "failed_retryable"),
            Self::FailedFatal => write!(f, "failed_fatal"),
        }
    }
}
