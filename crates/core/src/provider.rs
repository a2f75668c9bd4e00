//! Request building and the transport contract.
//!
//! The agent loop never talks HTTP itself. It shapes a [`Request`] with the
//! [`RequestBuilder`] and hands it to a [`Transport`], which answers with
//! either a line stream (streaming mode) or one JSON document.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{ContentBlock, Turn};
use crate::stream::{StopReason, Usage};
use crate::tool::{ToolCall, ToolDefinition};

const DEFAULT_MAX_TOKENS: u32 = 1024;

/// The outbound request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// System prompt. Omitted entirely when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Full conversation history
    pub messages: Vec<Turn>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

/// Shapes requests from conversation state. No I/O, no hidden state:
/// identical inputs always yield identical requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBuilder {
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl RequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build(
        &self,
        system_prompt: Option<&str>,
        history: &[Turn],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Request {
        Request {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system_prompt.map(str::to_string),
            messages: history.to_vec(),
            tools: tools.to_vec(),
            temperature: self.temperature,
            stream,
        }
    }
}

/// The terminal value of one model round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResponse {
    /// Completed blocks, in block-index order
    pub blocks: Vec<ContentBlock>,

    pub stop_reason: StopReason,

    /// Server-assigned message id, when reported
    pub id: Option<String>,

    /// Which model actually responded, when reported
    pub model: Option<String>,

    pub usage: Usage,

    /// The server's `error` event when `stop_reason` is `Error`
    pub error: Option<ServerFailure>,
}

/// A well-formed `error` event reported by the server mid-response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    pub error_type: String,
    pub message: String,
}

impl From<ServerFailure> for ProviderError {
    fn from(failure: ServerFailure) -> Self {
        ProviderError::Server {
            error_type: failure.error_type,
            message: failure.message,
        }
    }
}

impl FinalResponse {
    /// All text blocks, concatenated.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Tool calls in the order the model emitted them.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Raw SSE lines from a streaming response.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// What a transport hands back for one request.
pub enum TransportReply {
    /// Streaming mode: the response body split into lines.
    Lines(LineStream),
    /// Non-streaming mode: the complete response document.
    Document(serde_json::Value),
}

impl std::fmt::Debug for TransportReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lines(_) => f.write_str("TransportReply::Lines(..)"),
            Self::Document(doc) => f.debug_tuple("TransportReply::Document").field(doc).finish(),
        }
    }
}

/// The HTTP transport collaborator.
///
/// Implementations own credentials, headers, timeouts and retries; the agent
/// loop only sees a reply or a [`ProviderError`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// A human-readable name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request. Resolves once response headers have arrived.
    async fn send(&self, request: &Request) -> Result<TransportReply, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn history() -> Vec<Turn> {
        vec![
            Turn::user("what time is it?"),
            Turn::assistant(vec![ContentBlock::ToolUse {
                id: "t1".into(),
                name: "get_current_time".into(),
                input: json!({}),
            }]),
            Turn::user_blocks(vec![ContentBlock::tool_result("t1", "42", false)]),
        ]
    }

    fn tools() -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "get_current_time",
            "Get the current date and time",
            json!({"type": "object", "properties": {}}),
        )]
    }

    #[test]
    fn system_prompt_is_omitted_when_absent() {
        let builder = RequestBuilder::new("claude-sonnet-4-20250514");
        let request = builder.build(None, &history(), &[], true);
        let body = serde_json::to_value(&request).unwrap();

        let obj = body.as_object().unwrap();
        assert!(!obj.contains_key("system"));
        assert!(!obj.contains_key("tools"));
        assert!(!obj.contains_key("temperature"));
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn request_carries_system_history_and_tools() {
        let builder = RequestBuilder::new("claude-sonnet-4-20250514")
            .with_max_tokens(2048)
            .with_temperature(0.2);
        let request = builder.build(Some("You are terse."), &history(), &tools(), false);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["system"], "You are terse.");
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "what time is it?"}));
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "t1");
        assert_eq!(body["tools"][0]["name"], "get_current_time");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn building_is_deterministic() {
        let builder = RequestBuilder::new("m");
        let a = builder.build(Some("sys"), &history(), &tools(), true);
        let b = builder.build(Some("sys"), &history(), &tools(), true);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn final_response_views() {
        let response = FinalResponse {
            blocks: vec![
                ContentBlock::text("Let me check."),
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "get_current_time".into(),
                    input: json!({}),
                },
            ],
            stop_reason: StopReason::ToolUse,
            id: None,
            model: None,
            usage: Usage::default(),
            error: None,
        };
        assert_eq!(response.text(), "Let me check.");
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "t1");
    }

    #[test]
    fn server_failure_converts_to_provider_error() {
        let err: ProviderError = ServerFailure {
            error_type: "overloaded_error".into(),
            message: "Overloaded: try later".into(),
        }
        .into();
        match err {
            ProviderError::Server {
                error_type,
                message,
            } => {
                assert_eq!(error_type, "overloaded_error");
                assert_eq!(message, "Overloaded: try later");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
