//! Error types for the Johnathan domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] is the
//! umbrella the agent loop hands back to its caller.

use thiserror::Error;

use crate::message::Role;
use crate::stream::StopReason;

/// The top-level error type for all agent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Transport failures (network, HTTP status, broken stream) ---
    #[error("Transport error: {0}")]
    Transport(#[from] ProviderError),

    // --- Protocol violations (malformed events, history shape) ---
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The caller cancelled the in-flight exchange.
    #[error("Operation cancelled")]
    Cancelled,

    /// The model kept requesting tools past the configured round-trip limit.
    #[error("Tool loop exceeded {limit} model round-trips")]
    IterationLimit { limit: u32 },

    /// The agent loop was terminated and accepts no further input.
    #[error("Agent loop has terminated")]
    Terminated,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the HTTP transport collaborator.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The server sent a well-formed `error` event mid-stream.
    #[error("Server error ({error_type}): {message}")]
    Server { error_type: String, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// A breach of the conversation or streaming protocol.
///
/// Never repaired: the current turn is abandoned so that nothing malformed
/// reaches the history sent back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("First turn must have role user, got {0}")]
    FirstTurnNotUser(Role),

    #[error("Turn role {0} repeats the previous turn's role")]
    RoleNotAlternating(Role),

    #[error("A {role} turn cannot carry a {block} block")]
    MisplacedBlock { role: Role, block: &'static str },

    #[error("Tool use {0} was not answered by a tool result")]
    UnansweredToolUse(String),

    #[error("Tool result {0} does not answer any pending tool use")]
    UnexpectedToolResult(String),

    #[error("Tool use {0} was answered more than once")]
    DuplicateToolResult(String),

    #[error("Malformed stream event: {reason} (line: {raw_line})")]
    MalformedEvent { raw_line: String, reason: String },

    #[error("Delta for block {index} does not match the open block's kind")]
    DeltaKindMismatch { index: usize },

    #[error("Event references block {index}, which is not open")]
    UnknownBlock { index: usize },

    #[error("Block {index} was started twice")]
    DuplicateBlock { index: usize },

    #[error("Tool use block {index} was never stopped")]
    UnterminatedToolUse { index: usize },

    #[error("Tool input for block {index} is not valid JSON: {reason}")]
    InvalidToolInput { index: usize, reason: String },

    #[error("Stop reason was tool_use but no tool use blocks were produced")]
    ToolUseWithoutCalls,

    #[error("Tool use blocks were produced but the model stopped with {0:?}")]
    ToolCallsWithoutToolUseStop(StopReason),

    #[error("Message stopped without a stop reason")]
    MissingStopReason,

    #[error("Stream ended before message_stop")]
    IncompleteStream,
}

/// Tool lookup and execution failures.
///
/// These are recoverable: the loop reports them to the model as
/// `is_error` tool results instead of surfacing them to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// The tool's own error string, passed through untouched.
    #[error("{0}")]
    Execution(String),
}
