//! Workflow event emission.
//!
//! Every run session carries its own [`EventSink`]. The orchestrator, the
//! stage controllers and the tool gateway report lifecycle events through it.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the engine.
pub mod names {
    /// A session started running.
    pub const RUN_STARTED: &str = "run.started";
    /// A run reached Done.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// A run stopped on a fatal failure or exhausted budget.
    pub const RUN_ABORTED: &str = "run.aborted";
    /// A run stopped on its cancellation signal.
    pub const RUN_CANCELLED: &str = "run.cancelled";
    /// A stage controller started an invocation.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage invocation succeeded.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage invocation failed, retryably or not.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// The orchestrator moved to a new phase.
    pub const WORKFLOW_TRANSITION: &str = "workflow.transition";
    /// The gateway accepted a tool call.
    pub const TOOL_INVOKED: &str = "tool.invoked";
    /// A tool call returned a result.
    pub const TOOL_COMPLETED: &str = "tool.completed";
    /// A tool call failed.
    pub const TOOL_FAILED: &str = "tool.failed";
}
