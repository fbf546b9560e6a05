//! Sandboxed code execution tool.
//!
//! Each call gets a fresh temporary directory holding the provided files and
//! the entry script. The interpreter runs there with a cleared environment and
//! is killed if the gateway drops the call on timeout.

use super::{Tool, ToolDefinition};
use crate::core::is_safe_relative_path;
use crate::errors::ToolError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;

/// Registry name of the code execution tool.
pub const CODE_EXECUTION_TOOL: &str = "code_execution";

#[derive(Debug, Deserialize)]
struct ExecutionArgs {
    language: String,
    code: String,
    #[serde(default)]
    files: BTreeMap<String, String>,
    #[serde(default)]
    args: Vec<String>,
}

/// What a sandboxed run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Process exit code, -1 if killed by a signal.
    pub exit_code: i32,
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

#[derive(Debug, Clone)]
struct Interpreter {
    program: String,
    extension: &'static str,
}

/// Runs snippets of Python, shell or JavaScript in a throwaway directory.
#[derive(Debug, Clone)]
pub struct CodeExecutionTool {
    interpreters: BTreeMap<String, Interpreter>,
}

impl Default for CodeExecutionTool {
    fn default() -> Self {
        let mut interpreters = BTreeMap::new();
        for (language, program, extension) in [
            ("python", "python3", "py"),
            ("sh", "sh", "sh"),
            ("bash", "bash", "sh"),
            ("node", "node", "js"),
        ] {
            interpreters.insert(
                language.to_string(),
                Interpreter {
                    program: program.to_string(),
                    extension,
                },
            );
        }
        Self { interpreters }
    }
}

impl CodeExecutionTool {
    /// Creates the tool with the default interpreters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the program used for a language, e.g. `python` -> `python3.12`.
    #[must_use]
    pub fn with_interpreter(mut self, language: &str, program: impl Into<String>) -> Self {
        if let Some(interpreter) = self.interpreters.get_mut(language) {
            interpreter.program = program.into();
        }
        self
    }

    /// Supported language names.
    #[must_use]
    pub fn languages(&self) -> Vec<&str> {
        self.interpreters.keys().map(String::as_str).collect()
    }

    fn parse_args(&self, args: Value) -> Result<(ExecutionArgs, Interpreter), ToolError> {
        let parsed: ExecutionArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::invalid_arguments(CODE_EXECUTION_TOOL, e.to_string()))?;

        let interpreter = self
            .interpreters
            .get(&parsed.language)
            .cloned()
            .ok_or_else(|| {
                ToolError::invalid_arguments(
                    CODE_EXECUTION_TOOL,
                    format!("unsupported language '{}'", parsed.language),
                )
            })?;

        if let Some(bad) = parsed.files.keys().find(|p| !is_safe_relative_path(p)) {
            return Err(ToolError::invalid_arguments(
                CODE_EXECUTION_TOOL,
                format!("unsafe file path '{bad}'"),
            ));
        }
        Ok((parsed, interpreter))
    }
}

async fn write_files(root: &Path, files: &BTreeMap<String, String>) -> Result<()> {
    for (path, content) in files {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory for {path}"))?;
        }
        tokio::fs::write(&full_path, content)
            .await
            .with_context(|| format!("writing {path}"))?;
    }
    Ok(())
}

async fn run_sandboxed(args: &ExecutionArgs, interpreter: &Interpreter) -> Result<ExecutionReport> {
    let sandbox = tempfile::Builder::new()
        .prefix("forgeflow-exec-")
        .tempdir()
        .context("creating sandbox directory")?;

    write_files(sandbox.path(), &args.files).await?;
    let entry = format!("__entry.{}", interpreter.extension);
    tokio::fs::write(sandbox.path().join(&entry), &args.code)
        .await
        .context("writing entry script")?;

    let mut command = Command::new(&interpreter.program);
    command
        .arg(&entry)
        .args(&args.args)
        .current_dir(sandbox.path())
        .env_clear()
        .kill_on_drop(true);
    if let Some(path) = std::env::var_os("PATH") {
        command.env("PATH", path);
    }

    let output = command
        .output()
        .await
        .with_context(|| format!("spawning {}", interpreter.program))?;

    Ok(ExecutionReport {
        exit_code: output.status.code().unwrap_or(-1),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[async_trait]
impl Tool for CodeExecutionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(CODE_EXECUTION_TOOL)
            .with_description(
                "Run a code snippet in an isolated temporary directory and return \
                 its exit code, stdout and stderr.",
            )
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "language": {"type": "string", "enum": self.languages()},
                    "code": {"type": "string", "description": "Entry script source"},
                    "files": {
                        "type": "object",
                        "description": "Extra files by relative path",
                        "additionalProperties": {"type": "string"}
                    },
                    "args": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["language", "code"]
            }))
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let (args, interpreter) = self.parse_args(args)?;
        let report = run_sandboxed(&args, &interpreter)
            .await
            .map_err(|e| ToolError::execution_failed(CODE_EXECUTION_TOOL, format!("{e:#}")))?;
        serde_json::to_value(report)
            .map_err(|e| ToolError::execution_failed(CODE_EXECUTION_TOOL, e.to_string()))
    }
}
