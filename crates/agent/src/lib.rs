//! The Johnathan agent loop.
//!
//! One user message drives a cycle of:
//!
//! 1. **Send** the full history, system prompt and tool definitions
//! 2. **Accumulate** the streamed response into complete content blocks
//! 3. **If tool use**: run every requested tool, append the results as a
//!    user turn, and loop back to step 1
//! 4. **Otherwise**: commit the exchange and return the final text
//!
//! Progress is reported through an [`AgentObserver`]; cancellation goes
//! through a `tokio_util` `CancellationToken`.

pub mod accumulator;
pub mod loop_runner;
pub mod observer;
pub mod stream_event;

pub use accumulator::ResponseAccumulator;
pub use loop_runner::{AgentLoop, AgentState, ExchangeOutcome};
pub use observer::{AgentObserver, NoopObserver};
pub use stream_event::AgentStreamEvent;
