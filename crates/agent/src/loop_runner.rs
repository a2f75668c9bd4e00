//! The agent loop implementation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::join_all;
use johnathan_config::AppConfig;
use johnathan_core::stream::{decode, events_from_message};
use johnathan_core::{
    ContentBlock, Conversation, Error, FinalResponse, ProtocolViolation, ProviderError,
    RequestBuilder, ServerFailure, StopReason, StreamEvent, ToolCall, ToolRegistry, Transport,
    TransportReply, Turn, Usage,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::accumulator::ResponseAccumulator;
use crate::observer::AgentObserver;

/// Where the loop is in an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    AwaitingUserInput,
    RequestInFlight,
    StreamAccumulating,
    ToolDispatch,
    /// Reached after cancellation; the loop accepts no more input.
    Terminated,
}

/// Summary of one completed user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOutcome {
    pub conversation_id: String,

    /// Text of the final assistant turn
    pub text: String,

    /// Text the model produced alongside tool requests, in order
    pub interim_texts: Vec<String>,

    pub stop_reason: StopReason,

    /// Usage summed over every model round-trip
    pub usage: Usage,

    /// Model round-trips made
    pub iterations: u32,

    pub tool_calls_made: usize,
}

/// Drives one conversation: sends history to the model, accumulates the
/// streamed response, runs requested tools and loops until the model ends
/// its turn.
pub struct AgentLoop {
    transport: Arc<dyn Transport>,
    tools: Arc<ToolRegistry>,
    builder: RequestBuilder,
    system_prompt: Option<String>,
    stream: bool,
    max_iterations: u32,
    conversation: Conversation,
    state: AgentState,
}

impl AgentLoop {
    pub fn new(
        transport: Arc<dyn Transport>,
        tools: Arc<ToolRegistry>,
        builder: RequestBuilder,
    ) -> Self {
        Self {
            transport,
            tools,
            builder,
            system_prompt: None,
            stream: true,
            max_iterations: 25,
            conversation: Conversation::new(),
            state: AgentState::AwaitingUserInput,
        }
    }

    /// Build a loop with model, limits and prompt taken from configuration.
    ///
    /// Fails with [`Error::Config`] when the configuration does not validate.
    pub fn from_config(
        transport: Arc<dyn Transport>,
        tools: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Result<Self, Error> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let mut builder = RequestBuilder::new(&config.model).with_max_tokens(config.max_tokens);
        if let Some(t) = config.temperature {
            builder = builder.with_temperature(t);
        }

        let mut agent = Self::new(transport, tools, builder)
            .with_streaming(config.stream)
            .with_max_iterations(config.max_iterations);
        agent.system_prompt = config.system_prompt.clone();
        Ok(agent)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set the maximum number of model round-trips per user message.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Resume an existing conversation.
    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Committed history. Never contains a partial exchange.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Process one user message through to the model's final answer.
    ///
    /// The exchange runs against a staged copy of the conversation, which
    /// replaces the committed history only on success. On any error the
    /// history is exactly what it was before the call; on cancellation or a
    /// transport timeout the loop also moves to [`AgentState::Terminated`].
    pub async fn send(
        &mut self,
        user_text: impl Into<String>,
        observer: &dyn AgentObserver,
        cancel: &CancellationToken,
    ) -> Result<ExchangeOutcome, Error> {
        if self.state == AgentState::Terminated {
            return Err(Error::Terminated);
        }

        let mut working = self.conversation.clone();
        working.append(Turn::user(user_text))?;

        let span = info_span!(
            "exchange",
            conversation_id = %working.id,
            turns = working.len(),
        );
        let result = self
            .run_exchange(&mut working, observer, cancel)
            .instrument(span)
            .await;

        match result {
            Ok(outcome) => {
                self.conversation = working;
                self.set_state(AgentState::AwaitingUserInput, observer);
                info!(
                    conversation_id = %self.conversation.id,
                    iterations = outcome.iterations,
                    tool_calls = outcome.tool_calls_made,
                    "Exchange complete"
                );
                observer.on_complete(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                let next = match e {
                    Error::Cancelled | Error::Transport(ProviderError::Timeout(_)) => {
                        AgentState::Terminated
                    }
                    _ => AgentState::AwaitingUserInput,
                };
                warn!(conversation_id = %self.conversation.id, error = %e, "Exchange abandoned");
                self.set_state(next, observer);
                observer.on_error(&e);
                Err(e)
            }
        }
    }

    async fn run_exchange(
        &mut self,
        working: &mut Conversation,
        observer: &dyn AgentObserver,
        cancel: &CancellationToken,
    ) -> Result<ExchangeOutcome, Error> {
        let definitions = self.tools.definitions();
        let mut usage = Usage::default();
        let mut interim_texts = Vec::new();
        let mut tool_calls_made = 0;

        for iteration in 1..=self.max_iterations {
            debug!(iteration, "Model round-trip");
            self.set_state(AgentState::RequestInFlight, observer);

            let request = self.builder.build(
                self.system_prompt.as_deref(),
                working.history(),
                &definitions,
                self.stream,
            );
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                reply = self.transport.send(&request) => reply?,
            };

            let response = self.collect(reply, observer, cancel).await?;
            usage.add(response.usage);

            match response.stop_reason {
                StopReason::Error => {
                    let failure = response.error.unwrap_or_else(|| ServerFailure {
                        error_type: "error".into(),
                        message: "server reported an error".into(),
                    });
                    return Err(ProviderError::from(failure).into());
                }
                StopReason::ToolUse => {
                    let calls = response.tool_calls();
                    if calls.is_empty() {
                        return Err(ProtocolViolation::ToolUseWithoutCalls.into());
                    }
                    let interim = response.text();
                    working.append(Turn::assistant(response.blocks))?;
                    if !interim.is_empty() {
                        observer.on_interim_text(&interim);
                        interim_texts.push(interim);
                    }

                    self.set_state(AgentState::ToolDispatch, observer);
                    let results = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        results = dispatch(&self.tools, &calls, observer) => results,
                    };
                    tool_calls_made += calls.len();
                    working.append(Turn::user_blocks(results))?;
                }
                stop_reason => {
                    // Tool use blocks are only answerable under a tool_use stop.
                    if !response.tool_calls().is_empty() {
                        return Err(
                            ProtocolViolation::ToolCallsWithoutToolUseStop(stop_reason).into()
                        );
                    }
                    let text = response.text();
                    working.append(Turn::assistant(response.blocks))?;
                    return Ok(ExchangeOutcome {
                        conversation_id: working.id.to_string(),
                        text,
                        interim_texts,
                        stop_reason,
                        usage,
                        iterations: iteration,
                        tool_calls_made,
                    });
                }
            }
        }

        Err(Error::IterationLimit {
            limit: self.max_iterations,
        })
    }

    /// Fold one reply into a [`FinalResponse`], surfacing text as it arrives.
    async fn collect(
        &mut self,
        reply: TransportReply,
        observer: &dyn AgentObserver,
        cancel: &CancellationToken,
    ) -> Result<FinalResponse, Error> {
        let mut acc = ResponseAccumulator::new();

        match reply {
            TransportReply::Document(document) => {
                self.set_state(AgentState::StreamAccumulating, observer);
                for event in events_from_message(&document)? {
                    if let Some(done) = apply(&mut acc, event, observer)? {
                        return Ok(done);
                    }
                }
            }
            TransportReply::Lines(lines) => {
                let events = decode(lines);
                futures::pin_mut!(events);
                let mut first = true;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        next = events.next() => next,
                    };
                    let Some(event) = next else { break };
                    let event = event?;
                    if first {
                        self.set_state(AgentState::StreamAccumulating, observer);
                        first = false;
                    }
                    if let Some(done) = apply(&mut acc, event, observer)? {
                        return Ok(done);
                    }
                }
            }
        }

        Err(ProtocolViolation::IncompleteStream.into())
    }

    fn set_state(&mut self, state: AgentState, observer: &dyn AgentObserver) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "State change");
            self.state = state;
            observer.on_state_change(state);
        }
    }
}

fn apply(
    acc: &mut ResponseAccumulator,
    event: StreamEvent,
    observer: &dyn AgentObserver,
) -> Result<Option<FinalResponse>, ProtocolViolation> {
    if let StreamEvent::TextDelta { text, .. } = &event {
        observer.on_text_chunk(text);
    }
    acc.apply(event)
}

/// Run every call concurrently and return one result block per call, in
/// call order. A failing or panicking tool yields an `is_error` result and
/// never affects its siblings.
async fn dispatch(
    tools: &ToolRegistry,
    calls: &[ToolCall],
    observer: &dyn AgentObserver,
) -> Vec<ContentBlock> {
    let runs = calls.iter().map(|call| async move {
        observer.on_tool_start(call);
        let started = Instant::now();

        let outcome = AssertUnwindSafe(tools.execute(&call.name, call.input.clone()))
            .catch_unwind()
            .await;
        let (output, is_error) = match outcome {
            Ok(Ok(output)) => (output, false),
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (e.to_string(), true)
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(tool = %call.name, %reason, "Tool panicked");
                (format!("Tool {} panicked: {reason}", call.name), true)
            }
        };

        debug!(
            tool = %call.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            is_error,
            "Tool finished"
        );
        observer.on_tool_finish(call, &output, is_error);
        ContentBlock::tool_result(call.id.clone(), output, is_error)
    });

    join_all(runs).await
}
