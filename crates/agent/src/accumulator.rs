//! Folds one round-trip's stream events into a [`FinalResponse`].
//!
//! Blocks are keyed by the server's block index and kept in index order.
//! A text delta for an index nobody opened starts an implicit text block;
//! tool use blocks must be explicitly started and stopped.

use std::collections::BTreeMap;

use johnathan_core::{
    BlockKind, ContentBlock, FinalResponse, ProtocolViolation, ServerFailure, StopReason,
    StreamEvent, Usage,
};

#[derive(Debug)]
enum Partial {
    Text(String),
    ToolUse { id: String, name: String, json: String },
}

#[derive(Debug)]
enum Slot {
    Open(Partial),
    Done(ContentBlock),
}

/// Accumulation state for a single model response.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    slots: BTreeMap<usize, Slot>,
    id: Option<String>,
    model: Option<String>,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns the finished response once the message is
    /// complete (`MessageStop`, or a server `error` event).
    pub fn apply(
        &mut self,
        event: StreamEvent,
    ) -> Result<Option<FinalResponse>, ProtocolViolation> {
        match event {
            StreamEvent::MessageStart { id, model, usage } => {
                self.id = Some(id).filter(|s| !s.is_empty());
                self.model = Some(model).filter(|s| !s.is_empty());
                if let Some(usage) = usage {
                    self.usage.add(usage);
                }
            }
            StreamEvent::BlockStart { index, kind } => {
                if self.slots.contains_key(&index) {
                    return Err(ProtocolViolation::DuplicateBlock { index });
                }
                let partial = match kind {
                    BlockKind::Text => Partial::Text(String::new()),
                    BlockKind::ToolUse { id, name } => Partial::ToolUse {
                        id,
                        name,
                        json: String::new(),
                    },
                };
                self.slots.insert(index, Slot::Open(partial));
            }
            StreamEvent::TextDelta { index, text } => match self.slots.get_mut(&index) {
                None => {
                    self.slots.insert(index, Slot::Open(Partial::Text(text)));
                }
                Some(Slot::Open(Partial::Text(buf))) => buf.push_str(&text),
                Some(Slot::Open(Partial::ToolUse { .. })) => {
                    return Err(ProtocolViolation::DeltaKindMismatch { index });
                }
                Some(Slot::Done(_)) => return Err(ProtocolViolation::UnknownBlock { index }),
            },
            StreamEvent::InputJsonDelta {
                index,
                partial_json,
            } => match self.slots.get_mut(&index) {
                Some(Slot::Open(Partial::ToolUse { json, .. })) => json.push_str(&partial_json),
                Some(Slot::Open(Partial::Text(_))) => {
                    return Err(ProtocolViolation::DeltaKindMismatch { index });
                }
                None | Some(Slot::Done(_)) => {
                    return Err(ProtocolViolation::UnknownBlock { index });
                }
            },
            StreamEvent::BlockStop { index } => {
                let partial = match self.slots.remove(&index) {
                    Some(Slot::Open(partial)) => partial,
                    Some(done @ Slot::Done(_)) => {
                        self.slots.insert(index, done);
                        return Err(ProtocolViolation::UnknownBlock { index });
                    }
                    None => return Err(ProtocolViolation::UnknownBlock { index }),
                };
                let block = finalize(index, partial)?;
                self.slots.insert(index, Slot::Done(block));
            }
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if let Some(usage) = usage {
                    self.usage.add(usage);
                }
            }
            StreamEvent::MessageStop => return self.finish().map(Some),
            StreamEvent::Ping => {}
            StreamEvent::ServerError {
                error_type,
                message,
            } => {
                let blocks = std::mem::take(&mut self.slots)
                    .into_values()
                    .filter_map(|slot| match slot {
                        Slot::Done(block) => Some(block),
                        Slot::Open(_) => None,
                    })
                    .collect();
                return Ok(Some(FinalResponse {
                    blocks,
                    stop_reason: StopReason::Error,
                    id: self.id.take(),
                    model: self.model.take(),
                    usage: self.usage,
                    error: Some(ServerFailure {
                        error_type,
                        message,
                    }),
                }));
            }
            StreamEvent::Error { raw_line, reason } => {
                return Err(ProtocolViolation::MalformedEvent { raw_line, reason });
            }
        }
        Ok(None)
    }

    /// Close the message: flush implicit text blocks and check that every
    /// tool block was stopped.
    fn finish(&mut self) -> Result<FinalResponse, ProtocolViolation> {
        let mut blocks = Vec::with_capacity(self.slots.len());
        for (index, slot) in std::mem::take(&mut self.slots) {
            match slot {
                Slot::Done(block) => blocks.push(block),
                Slot::Open(Partial::Text(text)) => blocks.push(ContentBlock::Text { text }),
                Slot::Open(Partial::ToolUse { .. }) => {
                    return Err(ProtocolViolation::UnterminatedToolUse { index });
                }
            }
        }
        let stop_reason = self
            .stop_reason
            .ok_or(ProtocolViolation::MissingStopReason)?;

        Ok(FinalResponse {
            blocks,
            stop_reason,
            id: self.id.take(),
            model: self.model.take(),
            usage: self.usage,
            error: None,
        })
    }
}

fn finalize(index: usize, partial: Partial) -> Result<ContentBlock, ProtocolViolation> {
    match partial {
        Partial::Text(text) => Ok(ContentBlock::Text { text }),
        Partial::ToolUse { id, name, json } => {
            let input = if json.trim().is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                serde_json::from_str(&json).map_err(|e| ProtocolViolation::InvalidToolInput {
                    index,
                    reason: e.to_string(),
                })?
            };
            Ok(ContentBlock::ToolUse { id, name, input })
        }
    }
}
