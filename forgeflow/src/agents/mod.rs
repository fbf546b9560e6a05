//! Agent adapters.
//!
//! This module provides:
//! - The [`AgentAdapter`] trait and the per-invocation [`AgentContext`]
//! - [`LlmAgent`], an adapter over any [`CompletionService`]
//! - Transient-failure retry with backoff and jitter
//! - The [`AgentRegistry`] dispatch table
//! - An OpenAI-compatible HTTP completion client behind the `http` feature

mod adapter;
mod completion;
mod context;
#[cfg(feature = "http")]
mod http;
mod llm;
mod prompts;
mod registry;
mod retry;
mod sanitize;

pub use adapter::AgentAdapter;
#[cfg(test)]
pub use completion::MockCompletionService;
pub use completion::{
    ChatMessage, ChatRole, CompletionConfig, CompletionRequest, CompletionResponse,
    CompletionService, ToolCall,
};
pub use context::{AgentContext, AgentOutput};
#[cfg(feature = "http")]
pub use http::HttpCompletionService;
pub use llm::{AgentConfig, LlmAgent};
pub use prompts::role_preamble;
pub use registry::AgentRegistry;
pub use retry::{retry_transient, BackoffStrategy, JitterStrategy, RetryConfig, RetryState};
pub use sanitize::sanitize_text;
