//! OpenAI-compatible inference client.
//!
//! Sends chat completion requests to the configured model endpoint and
//! decodes the response into text and/or tool calls. The routing agent
//! consumes this through the [`ChatModel`] trait so tests can substitute a
//! deterministic scripted model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use crate::config::ModelSettings;

use super::errors::InferenceError;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelTurn, ToolCall,
    ToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout. Tool-routing turns replay the whole conversation,
/// so the model may need a while before the first byte.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─── ChatModel ───────────────────────────────────────────────────────────────

/// The capability the routing agent needs from a language model: given the
/// conversation so far and the tool schema, produce the next turn.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Result<ModelTurn, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the chat-completions endpoint.
///
/// Created from [`ModelSettings`]. Does NOT check connectivity at build
/// time — that happens on the first request.
pub struct InferenceClient {
    http: HttpClient,
    settings: ModelSettings,
}

impl InferenceClient {
    pub fn new(settings: ModelSettings) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: settings.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, settings })
    }

    /// Send a non-streaming chat completion request and decode the turn.
    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Result<ModelTurn, InferenceError> {
        let url = format!("{}/chat/completions", self.settings.base_url);

        let tools = if tools.is_empty() { None } else { Some(tools) };
        let body = ChatCompletionRequest {
            model: self.settings.model_name.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "sending chat completion request"
        );

        let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| InferenceError::MalformedResponse {
                    reason: e.to_string(),
                })?;

        decode_turn(parsed)
    }
}

#[async_trait]
impl ChatModel for InferenceClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Result<ModelTurn, InferenceError> {
        self.chat_completion(messages, tools).await
    }
}

// ─── Response decoding ───────────────────────────────────────────────────────

/// Decode the first completion choice into a [`ModelTurn`].
///
/// Tool-call ids are generated when the provider omits them. Arguments
/// arrive as a JSON-encoded string; an unparseable argument string is kept
/// as an empty object rather than failing the turn, and the registry's own
/// argument validation produces the model-visible error.
fn decode_turn(response: ChatCompletionResponse) -> Result<ModelTurn, InferenceError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::MalformedResponse {
            reason: "response contained no choices".to_string(),
        })?;

    let text = choice
        .message
        .content
        .filter(|content| !content.trim().is_empty());

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|wire| {
            let arguments = serde_json::from_str(&wire.function.arguments).unwrap_or_else(|e| {
                tracing::warn!(
                    tool = %wire.function.name,
                    error = %e,
                    "tool call arguments were not valid JSON"
                );
                serde_json::json!({})
            });
            ToolCall {
                id: wire.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
                name: wire.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ModelTurn { text, tool_calls })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::{CompletionChoice, CompletionMessage};

    fn response_with(message: CompletionMessage) -> ChatCompletionResponse {
        ChatCompletionResponse {
            choices: vec![CompletionChoice {
                message,
                finish_reason: None,
            }],
        }
    }

    #[test]
    fn decode_text_only_turn() {
        let turn = decode_turn(response_with(CompletionMessage {
            content: Some("El cierre terminó a las 06:12.".to_string()),
            tool_calls: None,
        }))
        .unwrap();
        assert!(turn.is_final_answer());
        assert_eq!(turn.text.as_deref(), Some("El cierre terminó a las 06:12."));
    }

    #[test]
    fn decode_generates_missing_tool_call_ids() {
        let body = r#"{
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "type": "function",
                        "function": {"name": "obtener_datos_cierre_comercial", "arguments": "{}"}
                    }]
                }
            }]
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let turn = decode_turn(parsed).unwrap();
        assert_eq!(turn.tool_calls.len(), 1);
        assert!(turn.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn decode_unparseable_arguments_become_empty_object() {
        let body = r#"{
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "t", "arguments": "not json"}
                    }]
                }
            }]
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let turn = decode_turn(parsed).unwrap();
        assert_eq!(turn.tool_calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn decode_blank_text_is_dropped() {
        let turn = decode_turn(response_with(CompletionMessage {
            content: Some("   ".to_string()),
            tool_calls: None,
        }))
        .unwrap();
        assert!(turn.text.is_none());
    }

    #[test]
    fn decode_empty_choices_is_an_error() {
        let err = decode_turn(ChatCompletionResponse { choices: vec![] }).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }
}
