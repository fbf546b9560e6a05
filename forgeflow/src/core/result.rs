//! Per-invocation stage results recorded in the workflow trace.

use super::{ArtifactRef, ControllerState, StageKind, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tool call made by an agent, logged against the calling stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// The stage whose agent made the call.
    pub stage: StageKind,
    /// Tool name as requested.
    pub tool: String,
    /// Call id assigned by the completion service, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Whether the gateway returned a result.
    pub ok: bool,
    /// Error message when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time of the call.
    pub duration_ms: u64,
    /// True if the response was cut to the size limit.
    #[serde(default)]
    pub truncated: bool,
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage that ran (or would have run).
    pub stage: StageKind,
    /// 1-based attempt number of this stage within the run.
    pub iteration: u32,
    /// Result status.
    pub status: StageStatus,
    /// Terminal controller state.
    pub state: ControllerState,
    /// Artifacts persisted by this invocation.
    #[serde(default)]
    pub produced_artifacts: Vec<ArtifactRef>,
    /// Validation failures, failing tests or error text.
    #[serde(default)]
    pub diagnostics: String,
    /// Tool calls made during the invocation.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// When the invocation ended.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a result with no artifacts, diagnostics or tool calls.
    #[must_use]
    pub fn new(
        stage: StageKind,
        iteration: u32,
        status: StageStatus,
        state: ControllerState,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            iteration,
            status,
            state,
            produced_artifacts: Vec::new(),
            diagnostics: String::new(),
            tool_calls: Vec::new(),
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Marker for a stage that never started because the run was cancelled.
    #[must_use]
    pub fn cancelled(stage: StageKind, iteration: u32, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            diagnostics: reason.into(),
            ended_at: now,
            ..Self::new(
                stage,
                iteration,
                StageStatus::Cancelled,
                ControllerState::Pending,
                now,
            )
        }
    }

    /// Sets the diagnostics.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = diagnostics.into();
        self
    }

    /// Sets the produced artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactRef>) -> Self {
        self.produced_artifacts = artifacts;
        self
    }

    /// Sets the tool call records.
    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    /// Returns true if this is a cancellation marker.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == StageStatus::Cancelled
    }
}
