//! Core domain model types for forgeflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage kinds, statuses and the controller state machine
//! - Project requests and their options
//! - Versioned artifacts and test reports
//! - Stage results and the run outcome

mod artifact;
mod outcome;
mod report;
mod request;
mod result;
mod status;

pub use artifact::{
    is_safe_relative_path, render_files, Artifact, ArtifactKind, ArtifactRef, FileSet, Payload,
};
pub use outcome::{FinalArtifacts, RunOutcome, RunStatus};
pub use report::{TestReport, TestVerdict};
pub use request::{ProjectRequest, RequestOptions};
pub use result::{StageResult, ToolCallRecord};
pub use status::{ControllerState, StageKind, StageStatus};
