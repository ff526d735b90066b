//! Session store — per-thread conversation history.
//!
//! An explicit service object mapping `thread_id` to an ordered, append-only
//! message list. Lifetime is the process lifetime: no eviction, no size cap,
//! no persistence. The store is handed by reference into the routing agent,
//! never held as ambient global state, so two sessions cannot read each
//! other's history.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::inference::types::{ChatMessage, Role, ToolCall};

// ─── StoredMessage ──────────────────────────────────────────────────────────

/// One conversational turn owned by a session. Immutable once appended;
/// append order is the replay order.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
}

impl StoredMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Convert to the wire form replayed to the model.
    pub fn to_chat_message(&self) -> ChatMessage {
        match (&self.tool_calls, &self.tool_call_id) {
            (Some(calls), _) => ChatMessage::assistant_tool_calls(calls),
            (None, Some(id)) => {
                ChatMessage::tool_result(id.clone(), self.content.clone().unwrap_or_default())
            }
            (None, None) => ChatMessage {
                role: self.role,
                content: self.content.clone(),
                tool_call_id: None,
                tool_calls: None,
            },
        }
    }
}

// ─── SessionStore ───────────────────────────────────────────────────────────

/// In-memory `thread_id → history` map. Sessions are created lazily on
/// first append and live until the process exits.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the session, creating it if this is the first
    /// message for `thread_id`.
    pub fn append(&self, thread_id: &str, message: StoredMessage) {
        let mut sessions = self.lock();
        sessions
            .entry(thread_id.to_string())
            .or_default()
            .push(message);
    }

    /// The full ordered history for `thread_id` (empty for unknown ids).
    pub fn history(&self, thread_id: &str) -> Vec<StoredMessage> {
        self.lock().get(thread_id).cloned().unwrap_or_default()
    }

    pub fn message_count(&self, thread_id: &str) -> usize {
        self.lock().get(thread_id).map(Vec::len).unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<StoredMessage>>> {
        // A poisoned lock means a panic mid-operation; the map itself is
        // still a consistent append-only structure, so keep serving it.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
