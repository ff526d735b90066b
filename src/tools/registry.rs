//! Tool registry — the fixed set of data fetchers exposed to the model.
//!
//! Provides:
//! - The [`Tool`] trait (name, model-facing description, parameter schema,
//!   invoke)
//! - Ordered listing of tool definitions for the chat completion request
//! - Dispatch by model-supplied name, with a typed unknown-tool error that
//!   never touches a fetcher

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::inference::types::{FunctionDefinition, ToolDefinition};

use super::errors::ToolError;

// ─── Tool ────────────────────────────────────────────────────────────────────

/// A named, described, callable data-fetch capability exposed to the model.
///
/// Descriptions are part of the model-facing contract: the model selects a
/// tool by matching user intent against the description text, so wording is
/// functional, not cosmetic.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema for the arguments object.
    fn parameters(&self) -> serde_json::Value;
    /// Execute the fetch. `Ok` is a JSON payload (possibly an empty
    /// collection); `Err` means the fetch itself failed.
    async fn invoke(&self, args: &serde_json::Value) -> Result<String, ToolError>;
}

/// Schema for tools that take no arguments.
pub(crate) fn no_parameters() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// Schema for tools that require a `fecha_cierre` date.
pub(crate) fn fecha_parameters() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "fecha_cierre": {
                "type": "string",
                "description": "Fecha de cierre en formato YYYY-MM-DD"
            }
        },
        "required": ["fecha_cierre"]
    })
}

/// Extract the required `fecha_cierre` argument as a date.
pub(crate) fn required_fecha(tool: &str, args: &serde_json::Value) -> Result<NaiveDate, ToolError> {
    let raw = args
        .get("fecha_cierre")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: "missing required field 'fecha_cierre'".to_string(),
        })?;

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: format!("'{raw}' is not a YYYY-MM-DD date: {e}"),
    })
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Static table of tools, built once at startup from the configured data
/// backend. Listing order is insertion order and is stable across calls;
/// it is the order the model sees in every request.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.push(Box::new(tool));
    }

    /// Ordered sequence of registered tools.
    pub fn list(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }

    /// Registered tool names, in listing order.
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Serialize all tools into the OpenAI function-calling format, in
    /// listing order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                r#type: "function".to_string(),
                function: FunctionDefinition {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters(),
                },
            })
            .collect()
    }

    /// Dispatch a model-requested call to the matching fetcher.
    ///
    /// A name outside the registry fails with [`ToolError::UnknownTool`]
    /// without invoking anything.
    pub async fn invoke(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })?;

        tool.invoke(args).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
