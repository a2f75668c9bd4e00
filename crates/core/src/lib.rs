//! # Johnathan Core
//!
//! Domain types, traits, and error definitions for the Johnathan agent.
//! This crate does no I/O; it defines the conversation model, the SSE
//! decoder, the tool contract and the request builder that the agent loop
//! and the transport implement against.

pub mod error;
pub mod message;
pub mod provider;
pub mod stream;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProtocolViolation, ProviderError, Result, ToolError};
pub use message::{Content, ContentBlock, Conversation, ConversationId, Role, Turn};
pub use provider::{
    FinalResponse, LineStream, Request, RequestBuilder, ServerFailure, Transport, TransportReply,
};
pub use stream::{BlockKind, StopReason, StreamEvent, Usage};
pub use tool::{Tool, ToolCall, ToolDefinition, ToolRegistry};
