//! Transport implementations for Johnathan.
//!
//! All transports implement the `johnathan_core::Transport` trait. The agent
//! loop only ever sees a line stream or a response document.

pub mod anthropic;

pub use anthropic::AnthropicTransport;
