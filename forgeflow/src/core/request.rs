//! The immutable project request that starts a run.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Optional configuration attached to a project request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Where the collaborator intends to write the generated project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Target language or framework hints ("Python", "FastAPI", ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language_hints: Vec<String>,
    /// Tools the agents may use; `None` enables every registered tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<BTreeSet<String>>,
    /// Revisions allowed per stage after its first attempt.
    #[serde(default = "default_max_iterations_per_stage")]
    pub max_iterations_per_stage: u32,
    /// Stage invocations allowed across the whole run.
    #[serde(default = "default_max_total_iterations")]
    pub max_total_iterations: u32,
    /// Tool calls allowed across the whole run.
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
}

fn default_max_iterations_per_stage() -> u32 {
    3
}

fn default_max_total_iterations() -> u32 {
    20
}

fn default_max_tool_calls() -> u32 {
    50
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            output_path: None,
            language_hints: Vec::new(),
            enabled_tools: None,
            max_iterations_per_stage: default_max_iterations_per_stage(),
            max_total_iterations: default_max_total_iterations(),
            max_tool_calls: default_max_tool_calls(),
        }
    }
}

impl RequestOptions {
    /// Creates options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output path.
    #[must_use]
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Adds a language hint.
    #[must_use]
    pub fn with_language_hint(mut self, hint: impl Into<String>) -> Self {
        self.language_hints.push(hint.into());
        self
    }

    /// Restricts the tools agents may call.
    #[must_use]
    pub fn with_enabled_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the per-stage revision budget.
    #[must_use]
    pub fn with_max_iterations_per_stage(mut self, max: u32) -> Self {
        self.max_iterations_per_stage = max;
        self
    }

    /// Sets the run-wide stage invocation budget.
    #[must_use]
    pub fn with_max_total_iterations(mut self, max: u32) -> Self {
        self.max_total_iterations = max;
        self
    }

    /// Sets the run-wide tool call budget.
    #[must_use]
    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = max;
        self
    }
}

/// A natural-language project request. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProjectRequest")]
pub struct ProjectRequest {
    description: String,
    options: RequestOptions,
}

#[derive(Deserialize)]
struct RawProjectRequest {
    description: String,
    #[serde(default)]
    options: RequestOptions,
}

impl TryFrom<RawProjectRequest> for ProjectRequest {
    type Error = ConfigError;

    fn try_from(raw: RawProjectRequest) -> Result<Self, Self::Error> {
        Self::with_options(raw.description, raw.options)
    }
}

impl ProjectRequest {
    /// Creates a request with default options.
    ///
    /// Fails if the description is blank.
    pub fn new(description: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_options(description, RequestOptions::default())
    }

    /// Creates a request with explicit options.
    pub fn with_options(
        description: impl Into<String>,
        options: RequestOptions,
    ) -> Result<Self, ConfigError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(ConfigError::InvalidRequest(
                "description must not be empty".to_string(),
            ));
        }
        if options.max_total_iterations == 0 {
            return Err(ConfigError::invalid_value(
                "max_total_iterations",
                "must allow at least one stage invocation",
            ));
        }
        Ok(Self {
            description,
            options,
        })
    }

    /// The free-text requirement description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The request options.
    #[must_use]
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Returns true if the tool may be used in this run.
    #[must_use]
    pub fn is_tool_enabled(&self, name: &str) -> bool {
        self.options
            .enabled_tools
            .as_ref()
            .map_or(true, |tools| tools.contains(name))
    }
}
