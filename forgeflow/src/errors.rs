//! Error types for the forgeflow engine.
//!
//! Each layer owns its error enum and decides locally whether a failure is
//! retried. `ForgeError` aggregates them for callers that only want one type.

use crate::core::{ArtifactRef, StageKind};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for forgeflow operations.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// An artifact store error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// An agent invocation error.
    #[error("{0}")]
    Agent(#[from] AgentError),

    /// A tool gateway error.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// Agent output rejected by a stage schema.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Invalid configuration or request.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by the artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No artifact exists for the reference.
    #[error("Artifact not found: {reference}")]
    NotFound {
        /// The unknown reference.
        reference: ArtifactRef,
    },

    /// A replayed log line could not be decoded.
    #[error("Corrupt artifact log at line {line}: {reason}")]
    CorruptLog {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A replayed entry broke the per-(stage, kind) iteration order.
    #[error("Non-monotonic iteration for {reference}: expected {expected}")]
    NonMonotonicIteration {
        /// The offending reference.
        reference: ArtifactRef,
        /// The iteration the store would have assigned.
        expected: u32,
    },

    /// A replayed payload does not hash to its recorded digest.
    #[error("Digest mismatch for {reference}")]
    DigestMismatch {
        /// The offending reference.
        reference: ArtifactRef,
    },

    /// IO error while exporting or replaying.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while invoking an agent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// Network failure, rate limit or overloaded backend. Retried.
    #[error("Transient completion failure: {0}")]
    Transient(String),

    /// The completion call exceeded its timeout. Retried.
    #[error("Completion call timed out after {timeout_ms}ms")]
    Timeout {
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// Malformed response after repair attempts, or a rejected request.
    #[error("Permanent agent failure: {0}")]
    Permanent(String),

    /// The run was cancelled at a retry boundary.
    #[error("Agent invocation cancelled: {0}")]
    Cancelled(String),
}

impl AgentError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Creates a permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    /// Returns true if the adapter may retry the call.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout { .. })
    }
}

/// Errors raised by the tool gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// No enabled tool is registered under this name.
    #[error("Unsupported tool: {name}")]
    UnsupportedTool {
        /// The tool name.
        name: String,
    },

    /// The tool did not answer within its timeout.
    #[error("Tool timed out: {name} after {timeout_ms}ms")]
    ToolTimeout {
        /// The tool name.
        name: String,
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// The session has used all of its tool calls.
    #[error("Tool call budget exhausted: {name} (limit {limit})")]
    BudgetExhausted {
        /// The tool name.
        name: String,
        /// The session limit.
        limit: u32,
    },

    /// The arguments do not match what the tool expects.
    #[error("Invalid arguments for tool {name}: {reason}")]
    InvalidArguments {
        /// The tool name.
        name: String,
        /// What was wrong.
        reason: String,
    },

    /// The tool ran but failed.
    #[error("Tool execution failed: {name} - {reason}")]
    ExecutionFailed {
        /// The tool name.
        name: String,
        /// The reason for failure.
        reason: String,
    },
}

impl ToolError {
    /// Creates an unsupported tool error.
    #[must_use]
    pub fn unsupported(name: impl Into<String>) -> Self {
        Self::UnsupportedTool { name: name.into() }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(name: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ToolTimeout {
            name: name.into(),
            timeout_ms,
        }
    }

    /// Creates an invalid arguments error.
    #[must_use]
    pub fn invalid_arguments(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an execution failed error.
    #[must_use]
    pub fn execution_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for timeouts, the only tool failure worth retrying.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ToolTimeout { .. })
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::UnsupportedTool { name } => {
                map.insert("type".to_string(), serde_json::json!("UnsupportedTool"));
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::ToolTimeout { name, timeout_ms } => {
                map.insert("type".to_string(), serde_json::json!("ToolTimeout"));
                map.insert("name".to_string(), serde_json::json!(name));
                map.insert("timeout_ms".to_string(), serde_json::json!(timeout_ms));
            }
            Self::BudgetExhausted { name, limit } => {
                map.insert("type".to_string(), serde_json::json!("ToolBudgetExhausted"));
                map.insert("name".to_string(), serde_json::json!(name));
                map.insert("limit".to_string(), serde_json::json!(limit));
            }
            Self::InvalidArguments { name, reason } => {
                map.insert("type".to_string(), serde_json::json!("ToolInvalidArguments"));
                map.insert("name".to_string(), serde_json::json!(name));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::ExecutionFailed { name, reason } => {
                map.insert("type".to_string(), serde_json::json!("ToolExecutionError"));
                map.insert("name".to_string(), serde_json::json!(name));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Agent output rejected by a stage schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid {stage} output: {message}")]
pub struct ValidationError {
    /// The stage whose schema was violated.
    pub stage: StageKind,
    /// What was wrong.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(stage: StageKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Errors raised while building a session or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The registry has no adapter for a stage.
    #[error("No agent registered for stage '{0}'")]
    MissingAgent(StageKind),

    /// The project request is unusable.
    #[error("Invalid project request: {0}")]
    InvalidRequest(String),

    /// A configuration field holds an unusable value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// What was wrong.
        reason: String,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
