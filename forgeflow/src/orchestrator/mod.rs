//! The multi-agent workflow engine.
//!
//! The [`Orchestrator`] owns one stage controller per stage and a
//! [`WorkflowState`]. After every stage result it picks the next transition:
//! advance, revise (Testing failures go back to Implementation) or abort.
//! Revisions are bounded per stage and invocations per run.

mod engine;
mod workflow;

#[cfg(test)]
mod integration_tests;

pub use engine::Orchestrator;
pub use workflow::{Transition, WorkflowPhase, WorkflowState};
