//! Testing utilities for forgeflow runs.
//!
//! This module provides:
//! - Scripted agents and tools
//! - Canned requests and stage outputs
//! - Assertions over run outcomes and traces

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_iterations_increase, assert_run_completed, assert_run_status, assert_stage_not_run,
    assert_trace, assert_within_revision_budget,
};
pub use mocks::{
    EchoTool, FailingAgent, RecordedInvocation, ScriptedAgent, SlowTool, StaticSearchBackend,
};
