//! Tool gateway and the reference tools.
//!
//! This module provides:
//! - The [`Tool`] trait, definitions and bounded results
//! - A name-keyed [`ToolRegistry`]
//! - The [`ToolGateway`] enforcing timeouts, size limits and call budgets
//! - Sandboxed code execution and web search tools

mod code_exec;
mod definitions;
mod gateway;
mod registry;
mod web_search;

pub use code_exec::{CodeExecutionTool, ExecutionReport, CODE_EXECUTION_TOOL};
pub use definitions::{Tool, ToolDefinition, ToolResult};
pub use gateway::{ToolGateway, ToolGatewayConfig};
pub use registry::ToolRegistry;
#[cfg(feature = "http")]
pub use web_search::{HtmlSearchBackend, HtmlSearchConfig};
pub use web_search::{SearchBackend, SearchHit, WebSearchTool, WEB_SEARCH_TOOL};
