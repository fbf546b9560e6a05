//! Tool definitions, the tool trait and call results.

use crate::errors::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Describes a tool to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name agents call it by.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Creates a definition with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Sets the argument schema.
    #[must_use]
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    /// Names of the required arguments declared by the schema.
    #[must_use]
    pub fn required_arguments(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Checks that `args` is an object carrying every required argument.
    pub fn check_arguments(&self, args: &Value) -> Result<(), ToolError> {
        let Some(object) = args.as_object() else {
            return Err(ToolError::invalid_arguments(
                &self.name,
                "arguments must be a JSON object",
            ));
        };
        if let Some(missing) = self
            .required_arguments()
            .into_iter()
            .find(|name| !object.contains_key(*name))
        {
            return Err(ToolError::invalid_arguments(
                &self.name,
                format!("missing required argument '{missing}'"),
            ));
        }
        Ok(())
    }

    /// OpenAI-style function declaration.
    #[must_use]
    pub fn to_function_spec(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// An external capability reachable through the tool gateway.
///
/// Implementations must not rely on the gateway for idempotence.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool definition. Its name is the registry key.
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool.
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// A bounded tool response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool that answered.
    pub tool: String,
    /// Response text, at most the gateway's size limit.
    pub content: String,
    /// True if the response was cut to the size limit.
    pub truncated: bool,
    /// Wall time of the call.
    pub duration_ms: u64,
}
