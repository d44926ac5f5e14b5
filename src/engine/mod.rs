//! The orchestration loop: one user turn from request to assembled result,
//! including the bounded tool-calling cycle.

pub mod assembler;
pub mod sink;

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::conversation::{ConversationContext, Message, ToolCallRecord};
use crate::error::EngineError;
use crate::protocol::canonical::{StreamEvent, ToolChoice, TurnResult, Vendor};
use crate::providers::{adapter_for, ParseState, TurnRequest, VendorAdapter};
use crate::stream::{FrameDecoder, RawFrame};
use crate::tools::accumulator::ToolCallAccumulator;
use crate::tools::ToolRegistry;
use crate::transport::{HttpTransport, PendingRequest, Transport};

use self::assembler::TurnAssembler;
use self::sink::{EventSink, SinkEvent};

/// Synthesized user message when a turn would otherwise go out with no user
/// input in the active window.
const KICKOFF_MESSAGE: &str = "Let's start";

const WAIT_THINKING: &str = "THINKING";
const WAIT_CALLING: &str = "CALLING FUNCTIONS";

/// Per-turn parameters chosen by the caller.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub vendor: Vendor,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub tool_choice: ToolChoice,
}

impl TurnOptions {
    #[must_use]
    pub fn new(vendor: Vendor, model: impl Into<String>) -> Self {
        Self {
            vendor,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Runs turns against any configured vendor, executing registered tools
/// between model calls until the model answers or the depth limit trips.
pub struct ChatEngine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    tools: ToolRegistry,
}

impl ChatEngine {
    /// Build an engine with the production HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the HTTP client cannot be built.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Build an engine over a caller-supplied transport.
    #[must_use]
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            tools: ToolRegistry::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    /// Run one user turn to completion.
    ///
    /// `user_input` is pushed onto the context when present; a turn without
    /// one (and with no user message in the active window) opens with a
    /// synthesized kickoff message. Presentation events stream to `sink`
    /// throughout; `Done` or `Error` is always the last event.
    ///
    /// # Errors
    ///
    /// Terminal failures only: configuration, network after retries,
    /// upstream protocol errors, and cancellation. Tool failures and
    /// malformed frames degrade inside the loop instead of propagating.
    pub async fn run_turn(
        &self,
        context: &mut ConversationContext,
        user_input: Option<Message>,
        options: &TurnOptions,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, EngineError> {
        match self.run_turn_inner(context, user_input, options, sink, cancel).await {
            Ok(result) => Ok(result),
            Err(err) => {
                sink.emit(SinkEvent::Error {
                    message: err.sink_message(),
                });
                Err(err)
            }
        }
    }

    async fn run_turn_inner(
        &self,
        context: &mut ConversationContext,
        user_input: Option<Message>,
        options: &TurnOptions,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, EngineError> {
        // Credential resolution happens before any message is recorded, so
        // a misconfigured vendor fails without mutating the conversation.
        let api_key = self.config.resolve_api_key(options.vendor)?;
        let adapter = adapter_for(options.vendor);

        if let Some(message) = user_input {
            sink.emit(SinkEvent::UserEcho {
                text: message.text.clone(),
            });
            context.push(message);
        }
        context.mark_active_window();
        if !context.window_has_user_message() {
            context.push(Message::user(KICKOFF_MESSAGE));
        }

        let mut assembler = TurnAssembler::new();
        let mut first_fragment = true;
        let mut depth: u32 = 0;

        loop {
            let body = {
                let window = context.mark_active_window();
                adapter.build_request(&TurnRequest {
                    model: &options.model,
                    messages: &window,
                    tools: self.tools.specs(),
                    tool_choice: &options.tool_choice,
                    temperature: options.temperature,
                    max_tokens: options.max_tokens,
                })
            };
            let url = adapter.endpoint(
                &self.config.base_url(options.vendor),
                &options.model,
                api_key.as_deref(),
            );
            let headers = adapter.headers(api_key.as_deref())?;
            let request = PendingRequest::post_json(options.vendor, url, headers, &body);

            sink.emit(SinkEvent::Wait {
                status: WAIT_THINKING.to_string(),
            });
            let mut handle = self.transport.send(request, cancel).await?;
            let status = handle.status;

            let mut decoder = FrameDecoder::new(adapter.framing());
            let mut state = ParseState::new();
            let mut accumulator = ToolCallAccumulator::new();
            let mut frames = Vec::new();
            let mut events = Vec::new();
            assembler.begin_cycle();

            loop {
                let chunk = tokio::select! {
                    () = cancel.cancelled() => return Err(EngineError::Cancelled),
                    chunk = handle.next_chunk() => chunk,
                };
                let Some(chunk) = chunk else { break };
                let chunk = chunk?;

                frames.clear();
                decoder.feed(&chunk, &mut frames);
                dispatch_frames(
                    adapter.as_ref(),
                    &frames,
                    status,
                    &mut state,
                    &mut accumulator,
                    &mut assembler,
                    sink,
                    &mut first_fragment,
                    &mut events,
                )?;
                if decoder.is_done() {
                    break;
                }
            }
            if !decoder.is_done() {
                frames.clear();
                decoder.finish(&mut frames);
                dispatch_frames(
                    adapter.as_ref(),
                    &frames,
                    status,
                    &mut state,
                    &mut accumulator,
                    &mut assembler,
                    sink,
                    &mut first_fragment,
                    &mut events,
                )?;
            }
            accumulator.finish_all();

            if accumulator.is_empty() {
                context.push(Message::assistant(assembler.cycle_text()));
                let result = assembler.finish();
                tracing::info!(
                    vendor = %options.vendor,
                    model = options.model.as_str(),
                    depth,
                    input_tokens = result.usage.input_tokens,
                    output_tokens = result.usage.output_tokens,
                    "turn complete"
                );
                sink.emit(SinkEvent::Done {
                    result: result.clone(),
                });
                return Ok(result);
            }

            let calls = accumulator.take_calls();
            let records: Vec<ToolCallRecord> = calls
                .iter()
                .map(|c| ToolCallRecord {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: c
                        .arguments
                        .as_ref()
                        .map_or_else(|| "{}".to_string(), |m| Value::Object(m.clone()).to_string()),
                })
                .collect();
            context.push(Message::assistant_tool_calls(assembler.cycle_text(), records));

            if depth >= self.config.max_call_depth {
                // The limit trips without another upstream request; the
                // turn ends with whatever the model produced so far.
                let notice = EngineError::DepthExceeded {
                    max: self.config.max_call_depth,
                }
                .to_string();
                tracing::warn!(vendor = %options.vendor, "{notice}");
                sink.emit(SinkEvent::SystemInfo {
                    text: notice.clone(),
                });
                let result = assembler.finish();
                sink.emit(SinkEvent::Done {
                    result: result.clone(),
                });
                return Ok(result);
            }
            depth += 1;

            sink.emit(SinkEvent::Wait {
                status: WAIT_CALLING.to_string(),
            });
            for call in &calls {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let empty = serde_json::Map::new();
                let args = call.arguments.as_ref().unwrap_or(&empty);
                let output = match self.tools.invoke(&call.name, args) {
                    Ok(output) => output,
                    // Failures go back to the model as text so it can
                    // recover or apologize instead of ending the turn.
                    Err(err) => {
                        tracing::warn!(
                            tool = call.name.as_str(),
                            error = %err,
                            "tool invocation failed"
                        );
                        format!("ERROR: {err}")
                    }
                };
                context.push(Message::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    output,
                ));
            }
        }
    }
}

/// Route the canonical events of a batch of frames: visible deltas to the
/// sink and assembler, tool-call events to the accumulator, in-stream errors
/// out as terminal.
#[allow(clippy::too_many_arguments)]
fn dispatch_frames(
    adapter: &dyn VendorAdapter,
    frames: &[RawFrame],
    status: u16,
    state: &mut ParseState,
    accumulator: &mut ToolCallAccumulator,
    assembler: &mut TurnAssembler,
    sink: &dyn EventSink,
    first_fragment: &mut bool,
    events: &mut Vec<StreamEvent>,
) -> Result<(), EngineError> {
    for frame in frames {
        events.clear();
        adapter.parse_frame(state, frame, events);
        for event in events.iter() {
            match event {
                StreamEvent::TextDelta(text) => {
                    sink.emit(SinkEvent::Fragment {
                        text: text.clone(),
                        first: *first_fragment,
                    });
                    *first_fragment = false;
                    assembler.absorb(event);
                }
                StreamEvent::ThinkingDelta(text) => {
                    sink.emit(SinkEvent::Thinking { text: text.clone() });
                    assembler.absorb(event);
                }
                StreamEvent::ToolCallStart { id, name } => accumulator.start(id.clone(), name.clone()),
                StreamEvent::ToolCallArgDelta { id, fragment } => {
                    accumulator.push_fragment(id, fragment);
                }
                StreamEvent::ToolCallEnd { id } => accumulator.finish(id),
                StreamEvent::StreamError { message } => {
                    return Err(EngineError::Protocol {
                        status,
                        message: message.clone(),
                    });
                }
                StreamEvent::Citation { .. }
                | StreamEvent::Finish(_)
                | StreamEvent::Usage(_) => assembler.absorb(event),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_options_defaults() {
        let options = TurnOptions::new(Vendor::OpenAi, "gpt-4.1");
        assert_eq!(options.vendor, Vendor::OpenAi);
        assert_eq!(options.model, "gpt-4.1");
        assert!(options.temperature.is_none());
        assert_eq!(options.tool_choice, ToolChoice::Auto);
    }
}
