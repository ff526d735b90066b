//! Tool-layer error types.
//!
//! Fetchers return these instead of collapsing every failure into an empty
//! payload, so callers and tests can tell "no data" (an `Ok` empty JSON
//! array) apart from "fetch failed". Degrading a failure into something the
//! model can read is the routing agent's decision, not the fetcher's.

use thiserror::Error;

/// Errors that can occur while resolving or executing a data tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A required environment variable (endpoint URL or credential) is absent.
    #[error("missing configuration: environment variable '{key}' is not set")]
    MissingConfig { key: String },

    /// Network/HTTP failure against a datalake endpoint.
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// SQL failure against the closing-events database.
    #[error("database error: {reason}")]
    Database { reason: String },

    /// The response body or row shape did not match the expected schema.
    #[error("unexpected data shape: {reason}")]
    DataShape { reason: String },

    /// The model requested a tool name that is not in the registry.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// The model supplied arguments the tool cannot use.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl From<rusqlite::Error> for ToolError {
    fn from(e: rusqlite::Error) -> Self {
        ToolError::Database {
            reason: e.to_string(),
        }
    }
}
