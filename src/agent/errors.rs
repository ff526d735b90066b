//! Agent-level error types.

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that can end a user turn without a final answer.
///
/// Fetcher failures never appear here: they are degraded to an empty
/// payload inside the turn and the model phrases the unavailability.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The language-model invocation itself failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// The model kept requesting tools past the configured round bound.
    #[error("tool-call loop exceeded {rounds} rounds without a final answer")]
    ToolLoopExceeded { rounds: usize },
}
