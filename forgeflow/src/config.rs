//! Process-level configuration: completion endpoint, agent limits, retry
//! policy, tool limits and tracing.
//!
//! Values come from defaults, an optional JSON file and environment
//! variables, applied in that order.
//!
//! # Environment Variables
//!
//! - `FORGEFLOW_MODEL` (fallback `MODEL_NAME`): completion model
//! - `FORGEFLOW_BASE_URL`: OpenAI-compatible endpoint root
//! - `FORGEFLOW_API_KEY` (fallback `GROQ_API_KEY`): bearer token
//! - `FORGEFLOW_TEMPERATURE`: sampling temperature
//! - `FORGEFLOW_MAX_TOKENS`: completion token limit
//! - `FORGEFLOW_AGENT_TIMEOUT_MS`: per completion call timeout
//! - `FORGEFLOW_MAX_TOOL_ROUNDS`: tool rounds per agent invocation
//! - `FORGEFLOW_ASCII_ONLY`: normalize agent output to ASCII
//! - `FORGEFLOW_MAX_ATTEMPTS`: completion attempts including the first
//! - `FORGEFLOW_RETRY_BASE_DELAY_MS`: base retry delay
//! - `FORGEFLOW_TOOL_TIMEOUT_MS`: per tool call timeout
//! - `FORGEFLOW_TOOL_MAX_RESPONSE_BYTES`: tool response size limit
//! - `FORGEFLOW_LOG_JSON`: emit JSON log lines

use crate::agents::{AgentConfig, CompletionConfig, RetryConfig};
use crate::errors::ConfigError;
use crate::observability::TracingConfig;
use crate::tools::ToolGatewayConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Complete forgeflow configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Completion endpoint settings.
    #[serde(default)]
    pub completion: CompletionConfig,
    /// Per-invocation agent limits.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Retry policy for transient completion failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Tool gateway limits.
    #[serde(default)]
    pub tools: ToolGatewayConfig,
    /// Subscriber setup.
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl ForgeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env_overrides()
    }

    /// Applies `FORGEFLOW_*` variables on top of this configuration.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup_any = |keys: &[&str]| keys.iter().find_map(|key| lookup(key));

        if let Some(model) = lookup_any(&["FORGEFLOW_MODEL", "MODEL_NAME"]) {
            self.completion.model = model;
        }
        if let Some(url) = lookup("FORGEFLOW_BASE_URL") {
            self.completion.base_url = url;
        }
        if let Some(key) = lookup_any(&["FORGEFLOW_API_KEY", "GROQ_API_KEY"]) {
            self.completion.api_key = Some(key);
        }
        if let Some(val) = lookup("FORGEFLOW_TEMPERATURE") {
            self.completion.temperature = parse_env_value(&val, "FORGEFLOW_TEMPERATURE")?;
        }
        if let Some(val) = lookup("FORGEFLOW_MAX_TOKENS") {
            self.completion.max_tokens = parse_env_value(&val, "FORGEFLOW_MAX_TOKENS")?;
        }

        if let Some(val) = lookup("FORGEFLOW_AGENT_TIMEOUT_MS") {
            self.agent.call_timeout_ms = parse_env_value(&val, "FORGEFLOW_AGENT_TIMEOUT_MS")?;
        }
        if let Some(val) = lookup("FORGEFLOW_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds = parse_env_value(&val, "FORGEFLOW_MAX_TOOL_ROUNDS")?;
        }
        if let Some(val) = lookup("FORGEFLOW_ASCII_ONLY") {
            self.agent.ascii_only = parse_env_bool(&val, "FORGEFLOW_ASCII_ONLY")?;
        }

        if let Some(val) = lookup("FORGEFLOW_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env_value(&val, "FORGEFLOW_MAX_ATTEMPTS")?;
        }
        if let Some(val) = lookup("FORGEFLOW_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_env_value(&val, "FORGEFLOW_RETRY_BASE_DELAY_MS")?;
        }

        if let Some(val) = lookup("FORGEFLOW_TOOL_TIMEOUT_MS") {
            self.tools.call_timeout_ms = parse_env_value(&val, "FORGEFLOW_TOOL_TIMEOUT_MS")?;
        }
        if let Some(val) = lookup("FORGEFLOW_TOOL_MAX_RESPONSE_BYTES") {
            self.tools.max_response_bytes =
                parse_env_value(&val, "FORGEFLOW_TOOL_MAX_RESPONSE_BYTES")?;
        }

        if let Some(val) = lookup("FORGEFLOW_LOG_JSON") {
            self.tracing.json = parse_env_bool(&val, "FORGEFLOW_LOG_JSON")?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        if self.agent.call_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "agent.call_timeout_ms",
                "must be positive",
            ));
        }
        if self.tools.call_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "tools.call_timeout_ms",
                "must be positive",
            ));
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(ConfigError::invalid_value(
                "completion.temperature",
                format!("{} is outside 0.0..=2.0", self.completion.temperature),
            ));
        }
        Ok(())
    }
}

fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_value(key, format!("could not parse '{value}'")))
}

fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(
            key,
            format!("expected boolean value, got '{value}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::new();
        assert_eq!(config.completion.model, "llama-3.3-70b-versatile");
        assert_eq!(config.agent.max_tool_rounds, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ForgeConfig::from_json_str(
            r#"{"agent": {"call_timeout_ms": 5000}, "tools": {"max_response_bytes": 1024}}"#,
        )
        .unwrap();

        assert_eq!(config.agent.call_timeout_ms, 5000);
        assert_eq!(config.agent.repair_attempts, 1);
        assert_eq!(config.tools.max_response_bytes, 1024);
        assert_eq!(config.tools.call_timeout_ms, 30_000);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        let err = ForgeConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"completion": {{"model": "local-model"}}}}"#).unwrap();

        let config = ForgeConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.completion.model, "local-model");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ForgeConfig::from_json_file("/nonexistent/forgeflow.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = ForgeConfig::new()
            .apply_overrides(env(&[
                ("FORGEFLOW_MODEL", "gpt-4o"),
                ("FORGEFLOW_API_KEY", "sk-test"),
                ("FORGEFLOW_AGENT_TIMEOUT_MS", "9000"),
                ("FORGEFLOW_TOOL_TIMEOUT_MS", "250"),
                ("FORGEFLOW_MAX_ATTEMPTS", "5"),
                ("FORGEFLOW_ASCII_ONLY", "off"),
                ("FORGEFLOW_LOG_JSON", "yes"),
            ]))
            .unwrap();

        assert_eq!(config.completion.model, "gpt-4o");
        assert_eq!(config.completion.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.agent.call_timeout_ms, 9000);
        assert_eq!(config.tools.call_timeout_ms, 250);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(!config.agent.ascii_only);
        assert!(config.tracing.json);
    }

    #[test]
    fn test_legacy_variable_fallbacks() {
        let config = ForgeConfig::new()
            .apply_overrides(env(&[("MODEL_NAME", "mixtral"), ("GROQ_API_KEY", "gsk-1")]))
            .unwrap();
        assert_eq!(config.completion.model, "mixtral");
        assert_eq!(config.completion.api_key.as_deref(), Some("gsk-1"));

        let config = ForgeConfig::new()
            .apply_overrides(env(&[
                ("MODEL_NAME", "mixtral"),
                ("FORGEFLOW_MODEL", "preferred"),
            ]))
            .unwrap();
        assert_eq!(config.completion.model, "preferred");
    }

    #[test]
    fn test_unparseable_override() {
        let err = ForgeConfig::new()
            .apply_overrides(env(&[("FORGEFLOW_MAX_TOKENS", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "FORGEFLOW_MAX_TOKENS"
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = ForgeConfig::new()
            .apply_overrides(env(&[("FORGEFLOW_MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = ForgeConfig::new();
        config.completion.api_key = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
