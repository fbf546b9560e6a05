//! # Forgeflow
//!
//! A multi-agent orchestration engine that turns a natural-language project
//! request into a generated codebase with tests, documentation and review
//! notes.
//!
//! Forgeflow provides:
//!
//! - **Stage controllers**: one per pipeline role, each owning the entry and
//!   exit contract of its stage
//! - **A bounded workflow**: Testing failures loop back to Implementation
//!   under a hard per-stage revision budget
//! - **A versioned artifact store**: append-only, replayable from a JSON-lines log
//! - **A tool gateway**: timeouts, size limits and a per-run call budget
//! - **Cancellation and events**: cooperative cancellation with an explicit
//!   trace marker, and event sinks for observability
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use forgeflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = ForgeConfig::from_env()?;
//! let service = Arc::new(HttpCompletionService::new(config.completion.clone())?);
//! let agents = AgentRegistry::uniform(Arc::new(LlmAgent::new(service)));
//!
//! let request = ProjectRequest::new("A CLI calculator that handles division by zero")?;
//! let outcome = RunSession::new(request, agents)?.run().await;
//! println!("{}: {} files", outcome.status, outcome.final_artifacts.files.len());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agents;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod session;
pub mod stages;
pub mod store;
pub mod testing;
pub mod tools;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agents::{
        AgentAdapter, AgentConfig, AgentContext, AgentOutput, AgentRegistry, CompletionConfig,
        CompletionService, LlmAgent, RetryConfig,
    };
    #[cfg(feature = "http")]
    pub use crate::agents::HttpCompletionService;
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ForgeConfig;
    pub use crate::core::{
        Artifact, ArtifactKind, ArtifactRef, FinalArtifacts, Payload, ProjectRequest,
        RequestOptions, RunOutcome, RunStatus, StageKind, StageResult, StageStatus,
    };
    pub use crate::errors::{
        AgentError, ConfigError, ForgeError, StoreError, ToolError, ValidationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, TracingConfig};
    pub use crate::session::{RunSession, SessionBuilder};
    pub use crate::store::ArtifactStore;
    pub use crate::tools::{Tool, ToolDefinition, ToolGateway, ToolGatewayConfig, ToolRegistry};
}
