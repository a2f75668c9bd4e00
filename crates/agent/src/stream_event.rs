//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is the serializable form of the observer callbacks, for
//! front-ends that would rather drain a channel than implement
//! [`AgentObserver`](crate::AgentObserver).

use johnathan_core::{StopReason, Usage};
use serde::{Deserialize, Serialize};

use crate::loop_runner::AgentState;

/// Events emitted by the agent while it works through one user message.
///
/// - `chunk`         — partial text from the model
/// - `interim_text`  — text the model produced before requesting tools
/// - `tool_call`     — a tool is about to run
/// - `tool_result`   — a tool finished
/// - `state_changed` — the loop moved to a new state
/// - `done`          — the exchange completed
/// - `error`         — the exchange failed and nothing was committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Chunk {
        content: String,
    },

    InterimText {
        content: String,
    },

    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },

    StateChanged {
        state: AgentState,
    },

    Done {
        conversation_id: String,
        stop_reason: StopReason,
        usage: Usage,
        iterations: u32,
        tool_calls_made: usize,
    },

    Error {
        message: String,
    },
}

impl AgentStreamEvent {
    /// SSE-style event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::InterimText { .. } => "interim_text",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::StateChanged { .. } => "state_changed",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
