//! Server-sent-event stream decoding.
//!
//! Turns `data: <json>` lines into typed [`StreamEvent`]s. Decoding is
//! purely local: every line is parsed on its own, and a line that cannot be
//! classified becomes [`StreamEvent::Error`] instead of ending the stream.
//! Nothing here knows about tools or conversation state.

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ProtocolViolation, ProviderError};

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Error,
}

/// Token usage reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Fold another report into this one. Saturates at `u32::MAX`.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// The kind of content block a `BlockStart` opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    ToolUse { id: String, name: String },
}

/// One decoded protocol event. Transient: consumed once, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    MessageStart {
        id: String,
        model: String,
        usage: Option<Usage>,
    },
    BlockStart {
        index: usize,
        kind: BlockKind,
    },
    TextDelta {
        index: usize,
        text: String,
    },
    InputJsonDelta {
        index: usize,
        partial_json: String,
    },
    BlockStop {
        index: usize,
    },
    MessageDelta {
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
    },
    MessageStop,
    /// Keep-alive.
    Ping,
    /// A well-formed `error` event sent by the server.
    ServerError {
        error_type: String,
        message: String,
    },
    /// A `data:` line that could not be decoded.
    Error {
        raw_line: String,
        reason: String,
    },
}

// --- Wire shapes ---

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: WireMessageStart,
    },
    ContentBlockStart {
        index: usize,
        content_block: WireBlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: WireDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: WireMessageDelta,
        #[serde(default)]
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    Error {
        error: WireError,
    },
}

#[derive(Deserialize)]
struct WireMessageStart {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlockStart {
    Text {},
    ToolUse { id: String, name: String },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Deserialize)]
struct WireMessageDelta {
    #[serde(default)]
    stop_reason: Option<StopReason>,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

impl From<WireEvent> for StreamEvent {
    fn from(event: WireEvent) -> Self {
        match event {
            WireEvent::MessageStart { message } => StreamEvent::MessageStart {
                id: message.id,
                model: message.model,
                usage: message.usage,
            },
            WireEvent::ContentBlockStart {
                index,
                content_block,
            } => StreamEvent::BlockStart {
                index,
                kind: match content_block {
                    WireBlockStart::Text {} => BlockKind::Text,
                    WireBlockStart::ToolUse { id, name } => BlockKind::ToolUse { id, name },
                },
            },
            WireEvent::ContentBlockDelta { index, delta } => match delta {
                WireDelta::TextDelta { text } => StreamEvent::TextDelta { index, text },
                WireDelta::InputJsonDelta { partial_json } => {
                    StreamEvent::InputJsonDelta { index, partial_json }
                }
            },
            WireEvent::ContentBlockStop { index } => StreamEvent::BlockStop { index },
            WireEvent::MessageDelta { delta, usage } => StreamEvent::MessageDelta {
                stop_reason: delta.stop_reason,
                usage,
            },
            WireEvent::MessageStop => StreamEvent::MessageStop,
            WireEvent::Ping => StreamEvent::Ping,
            WireEvent::Error { error } => StreamEvent::ServerError {
                error_type: error.error_type,
                message: error.message,
            },
        }
    }
}

/// Decode a single SSE line.
///
/// Returns `None` for lines that carry no event: blank separators,
/// `event:` names, `:` comments and empty `data:` payloads.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix("data:") else {
        if !line.is_empty() {
            trace!(line = %line, "Ignoring non-data SSE line");
        }
        return None;
    };
    let data = data.trim_start();
    if data.is_empty() {
        return None;
    }

    let event = match serde_json::from_str::<WireEvent>(data) {
        Ok(wire) => wire.into(),
        Err(e) => StreamEvent::Error {
            raw_line: line.to_string(),
            reason: e.to_string(),
        },
    };
    Some(event)
}

/// Lazily decode a finite sequence of lines.
///
/// Stops after `MessageStop` even if more lines follow.
pub fn decode_lines<I>(lines: I) -> impl Iterator<Item = StreamEvent>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| decode_line(line.as_ref()))
        .scan(false, |stopped, event| {
            if *stopped {
                return None;
            }
            *stopped = event == StreamEvent::MessageStop;
            Some(event)
        })
}

/// Decode a transport line stream.
///
/// Ends when the transport closes or after `MessageStop`. A transport error
/// is yielded once and ends the stream.
pub fn decode<S>(lines: S) -> impl Stream<Item = Result<StreamEvent, ProviderError>>
where
    S: Stream<Item = Result<String, ProviderError>> + Unpin,
{
    stream::unfold(Some(lines), |state| async move {
        let mut lines = state?;
        while let Some(item) = lines.next().await {
            match item {
                Err(e) => return Some((Err(e), None)),
                Ok(line) => {
                    if let Some(event) = decode_line(&line) {
                        let rest = (event != StreamEvent::MessageStop).then_some(lines);
                        return Some((Ok(event), rest));
                    }
                }
            }
        }
        None
    })
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    content: Vec<WireContent>,
    #[serde(default)]
    stop_reason: Option<StopReason>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// Expand a complete (non-streaming) response document into the event
/// sequence a stream would have produced, ending in `MessageStop`.
pub fn events_from_message(
    document: &serde_json::Value,
) -> Result<Vec<StreamEvent>, ProtocolViolation> {
    let message = WireMessage::deserialize(document).map_err(|e| {
        ProtocolViolation::MalformedEvent {
            raw_line: document.to_string(),
            reason: e.to_string(),
        }
    })?;

    let mut events = vec![StreamEvent::MessageStart {
        id: message.id,
        model: message.model,
        usage: None,
    }];

    for (index, block) in message.content.into_iter().enumerate() {
        match block {
            WireContent::Text { text } => {
                events.push(StreamEvent::BlockStart {
                    index,
                    kind: BlockKind::Text,
                });
                events.push(StreamEvent::TextDelta { index, text });
            }
            WireContent::ToolUse { id, name, input } => {
                events.push(StreamEvent::BlockStart {
                    index,
                    kind: BlockKind::ToolUse { id, name },
                });
                events.push(StreamEvent::InputJsonDelta {
                    index,
                    partial_json: input.to_string(),
                });
            }
        }
        events.push(StreamEvent::BlockStop { index });
    }

    events.push(StreamEvent::MessageDelta {
        stop_reason: message.stop_reason,
        usage: message.usage,
    });
    events.push(StreamEvent::MessageStop);
    Ok(events)
}
