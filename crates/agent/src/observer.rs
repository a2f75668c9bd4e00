//! Callbacks through which the agent loop reports progress.

use johnathan_core::{Error, ToolCall};
use tokio::sync::mpsc;

use crate::loop_runner::{AgentState, ExchangeOutcome};
use crate::stream_event::AgentStreamEvent;

/// Receives progress notifications from [`AgentLoop`](crate::AgentLoop).
///
/// Every method has a no-op default. Callbacks run inline on the loop's
/// task, so they should return quickly. Tool callbacks may arrive from
/// concurrently running tools in any order.
pub trait AgentObserver: Send + Sync {
    /// A text delta arrived from the model.
    fn on_text_chunk(&self, _text: &str) {}

    /// The model produced text and then asked for tools.
    fn on_interim_text(&self, _text: &str) {}

    fn on_tool_start(&self, _call: &ToolCall) {}

    fn on_tool_finish(&self, _call: &ToolCall, _output: &str, _is_error: bool) {}

    fn on_state_change(&self, _state: AgentState) {}

    fn on_complete(&self, _outcome: &ExchangeOutcome) {}

    /// The exchange failed; history is unchanged.
    fn on_error(&self, _error: &Error) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AgentObserver for NoopObserver {}

/// Forwards every callback as an [`AgentStreamEvent`]. A closed receiver
/// is ignored.
impl AgentObserver for mpsc::UnboundedSender<AgentStreamEvent> {
    fn on_text_chunk(&self, text: &str) {
        let _ = self.send(AgentStreamEvent::Chunk {
            content: text.to_string(),
        });
    }

    fn on_interim_text(&self, text: &str) {
        let _ = self.send(AgentStreamEvent::InterimText {
            content: text.to_string(),
        });
    }

    fn on_tool_start(&self, call: &ToolCall) {
        let _ = self.send(AgentStreamEvent::ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });
    }

    fn on_tool_finish(&self, call: &ToolCall, output: &str, is_error: bool) {
        let _ = self.send(AgentStreamEvent::ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            output: output.to_string(),
            is_error,
        });
    }

    fn on_state_change(&self, state: AgentState) {
        let _ = self.send(AgentStreamEvent::StateChanged { state });
    }

    fn on_complete(&self, outcome: &ExchangeOutcome) {
        let _ = self.send(AgentStreamEvent::Done {
            conversation_id: outcome.conversation_id.clone(),
            stop_reason: outcome.stop_reason,
            usage: outcome.usage,
            iterations: outcome.iterations,
            tool_calls_made: outcome.tool_calls_made,
        });
    }

    fn on_error(&self, error: &Error) {
        let _ = self.send(AgentStreamEvent::Error {
            message: error.to_string(),
        });
    }
}
