//! The terminal value of a run.

use super::{Artifact, ArtifactKind, FileSet, StageKind, StageResult, TestReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Review finished; every stage succeeded.
    Completed,
    /// A fatal stage failure, a zero revision budget or cancellation.
    Aborted,
    /// A stage or the whole run ran out of iterations.
    BudgetExceeded,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::BudgetExceeded => write!(f, "budget_exceeded"),
        }
    }
}

/// The artifact bundle handed back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalArtifacts {
    /// Latest artifact of every kind that was produced.
    pub artifacts: Vec<Artifact>,
    /// Source, test and documentation files by relative path.
    pub files: FileSet,
    /// The latest test report, if Testing ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_report: Option<TestReport>,
    /// The documentation rendered as one text, if Documentation ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
}

impl FinalArtifacts {
    /// Assembles the bundle from the latest artifact of each kind.
    #[must_use]
    pub fn from_latest(latest: &[Arc<Artifact>]) -> Self {
        let mut bundle = Self::default();

        for artifact in latest {
            match artifact.kind {
                ArtifactKind::SourceFiles | ArtifactKind::TestFiles => {
                    if let Some(files) = artifact.payload.to_files() {
                        bundle.files.extend(files);
                    }
                }
                ArtifactKind::Documentation => {
                    if let Some(files) = artifact.payload.to_files() {
                        bundle.documentation = Some(
                            files
                                .values()
                                .map(String::as_str)
                                .collect::<Vec<_>>()
                                .join("\n\n"),
                        );
                        bundle.files.extend(files);
                    } else {
                        bundle.documentation = Some(artifact.payload.render());
                    }
                }
                ArtifactKind::TestReport => {
                    bundle.test_report = artifact
                        .payload
                        .as_json()
                        .and_then(|value| serde_json::from_value(value.clone()).ok());
                }
                ArtifactKind::RequirementsSpec
                | ArtifactKind::ArchitectureDoc
                | ArtifactKind::ReviewNotes => {}
            }
            bundle.artifacts.push(artifact.as_ref().clone());
        }

        bundle
    }

    /// Returns the latest artifact of a kind.
    #[must_use]
    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    /// Kinds present in the bundle.
    #[must_use]
    pub fn kinds(&self) -> Vec<ArtifactKind> {
        self.artifacts.iter().map(|a| a.kind).collect()
    }
}

/// Terminal value of a run. Created once when the workflow stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// The session id.
    pub run_id: Uuid,
    /// How the run ended.
    pub status: RunStatus,
    /// The artifact bundle.
    pub final_artifacts: FinalArtifacts,
    /// Every stage invocation in order.
    pub trace: Vec<StageResult>,
    /// Revisions used per stage.
    #[serde(default)]
    pub iteration_counts: BTreeMap<StageKind, u32>,
    /// Why the run did not complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// True if the run stopped on a cancellation signal.
    #[serde(default)]
    pub cancelled: bool,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run stopped.
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    /// Returns true if the run completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Stages in trace order.
    #[must_use]
    pub fn stage_sequence(&self) -> Vec<StageKind> {
        self.trace.iter().map(|r| r.stage).collect()
    }

    /// Number of tool calls across the trace.
    #[must_use]
    pub fn tool_call_count(&self) -> usize {
        self.trace.iter().map(|r| r.tool_calls.len()).sum()
    }

    /// Duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Serializes the outcome, trace included.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
