//! Conversational Q&A agent over the daily closing process.
//!
//! A language model routes each user question to one of a fixed set of
//! read-only data tools (closing-events SQL aggregation, datalake HTTP
//! summaries, per-task detail top-N), folds the tool result back into the
//! session history, and produces a concise executive answer in Spanish.
//!
//! Modules:
//! - [`agent`]: session store + routing agent loop
//! - [`inference`]: OpenAI-compatible chat-completion client
//! - [`tools`]: tool registry and data fetchers
//! - [`config`]: YAML configuration with env interpolation

pub mod agent;
pub mod config;
pub mod inference;
pub mod tools;
