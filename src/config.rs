//! Agent configuration loading and validation.
//!
//! Reads `config.yaml` and resolves environment variables. Config is the
//! single source of truth for the model endpoint, sampling, the tool-round
//! bound, and which data backend the tool registry is built from.
//!
//! Fetcher endpoint URLs and the datalake access token are NOT part of this
//! file. They are read from the process environment at call time, so a
//! missing variable surfaces as a failed fetch rather than a startup crash.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::inference::InferenceError;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Which data backend the tool registry is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBackend {
    /// Closing events table in a local SQLite database.
    Sqlite,
    /// Datalake HTTP endpoints (commercial/regulatory summaries, task detail).
    Datalake,
}

/// Model endpoint and sampling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// OpenAI-compatible API root, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Routing-agent behavior knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    /// Maximum tool-call round trips per user turn. The turn fails with a
    /// tool-loop error once this many rounds have run without a final
    /// answer.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Top-level configuration (mirrors `config.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    pub data_backend: DataBackend,
    /// Path to the closing-events SQLite database (sqlite backend only).
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_max_tool_rounds() -> usize {
    10
}
fn default_sqlite_path() -> String {
    "data/sqlite/cierre.db".to_string()
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve the config path.
///
/// Checks the `CIERRE_AGENT_CONFIG` env var first, then walks upward from
/// `start` looking for `config.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, InferenceError> {
    if let Ok(explicit) = std::env::var("CIERRE_AGENT_CONFIG") {
        let candidate = PathBuf::from(&explicit);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join("config.yaml");
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(InferenceError::ConfigError {
        reason: "could not find config.yaml".into(),
    })
}

/// Load and parse the configuration file.
///
/// Performs environment-variable interpolation on values matching
/// `${VAR_NAME}` or `${VAR_NAME:-default}` before parsing.
pub fn load_config(path: &Path) -> Result<AppConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;

    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
