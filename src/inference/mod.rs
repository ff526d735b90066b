//! Inference client — OpenAI-compatible chat completions.
//!
//! This module handles all communication with the model endpoint:
//! - Non-streaming chat completions with tool definitions
//! - Tool call decoding (ids, JSON-string arguments)
//! - The [`ChatModel`] seam the routing agent is generic over
//!
//! The client speaks the OpenAI Chat Completions API, making the model
//! interchangeable via config.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{ChatModel, InferenceClient};
pub use errors::InferenceError;
pub use types::{ChatMessage, ModelTurn, Role, ToolCall, ToolDefinition};
