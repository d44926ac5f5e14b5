//! Cohere v2 chat dialect. SSE frames carry a `type` discriminator in the
//! payload, one tool call streams at a time between explicit start and end
//! events, and the stream ends at EOF with no `[DONE]` sentinel.

use serde_json::{json, Value};

use crate::conversation::{Message, Role};
use crate::error::EngineError;
use crate::protocol::canonical::{StreamEvent, ToolChoice, Usage, Vendor};
use crate::protocol::mapping::{cohere_finish_to_canonical, role_to_cohere};
use crate::stream::RawFrame;

use super::{header_map, ParseState, TurnRequest, VendorAdapter};

pub struct CohereAdapter;

impl VendorAdapter for CohereAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Cohere
    }

    fn endpoint(&self, base_url: &str, _model: &str, _api_key: Option<&str>) -> String {
        format!("{base_url}/chat")
    }

    fn headers(&self, api_key: Option<&str>) -> Result<http::HeaderMap, EngineError> {
        header_map(&[
            ("content-type", "application/json".to_string()),
            ("accept", "text/event-stream".to_string()),
            (
                "authorization",
                format!("Bearer {}", api_key.unwrap_or_default()),
            ),
        ])
    }

    fn build_request(&self, request: &TurnRequest<'_>) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(|m| encode_message(m)).collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
            if let ToolChoice::Required = request.tool_choice {
                body["tool_choice"] = json!("REQUIRED");
            } else if let ToolChoice::None = request.tool_choice {
                body["tool_choice"] = json!("NONE");
            }
        }

        body
    }

    fn parse_frame(&self, state: &mut ParseState, frame: &RawFrame, out: &mut Vec<StreamEvent>) {
        let json = &frame.json;
        let kind = json.get("type").and_then(Value::as_str).unwrap_or_default();

        match kind {
            "content-delta" => {
                if let Some(text) = json
                    .pointer("/delta/message/content/text")
                    .and_then(Value::as_str)
                {
                    if !text.is_empty() {
                        out.push(StreamEvent::TextDelta(text.to_string()));
                    }
                }
            }
            // The model narrates its plan before calling tools.
            "tool-plan-delta" => {
                if let Some(text) = json
                    .pointer("/delta/message/tool_plan")
                    .and_then(Value::as_str)
                {
                    if !text.is_empty() {
                        out.push(StreamEvent::ThinkingDelta(text.to_string()));
                    }
                }
            }
            "tool-call-start" => {
                let call = json.pointer("/delta/message/tool_calls");
                let id = call
                    .and_then(|c| c.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let name = call
                    .and_then(|c| c.pointer("/function/name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                state.track_start(&id);
                out.push(StreamEvent::ToolCallStart { id: id.clone(), name });
                if let Some(fragment) = call
                    .and_then(|c| c.pointer("/function/arguments"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                {
                    out.push(StreamEvent::ToolCallArgDelta {
                        id,
                        fragment: fragment.to_string(),
                    });
                }
            }
            "tool-call-delta" => {
                // Only one call streams at a time; deltas belong to the
                // most recently started call.
                if let Some(fragment) = json
                    .pointer("/delta/message/tool_calls/function/arguments")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                {
                    if let Some(id) = state.open_calls.last().cloned() {
                        out.push(StreamEvent::ToolCallArgDelta {
                            id,
                            fragment: fragment.to_string(),
                        });
                    }
                }
            }
            "tool-call-end" => {
                if let Some(id) = state.open_calls.last().cloned() {
                    state.close(&id, out);
                }
            }
            "message-end" => {
                if let Some(usage) = json.pointer("/delta/usage/tokens") {
                    out.push(StreamEvent::Usage(Usage {
                        input_tokens: usage.get("input_tokens").and_then(Value::as_u64),
                        output_tokens: usage.get("output_tokens").and_then(Value::as_u64),
                    }));
                }
                state.close_all(out);
                let reason = json
                    .pointer("/delta/finish_reason")
                    .and_then(Value::as_str)
                    .unwrap_or("COMPLETE");
                out.push(StreamEvent::Finish(cohere_finish_to_canonical(reason)));
            }
            // message-start, content-start, content-end, citation events
            _ => {}
        }
    }
}

fn encode_message(message: &Message) -> Value {
    match message.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.as_deref().unwrap_or_default(),
            "content": message.text,
        }),
        Role::Assistant if !message.tool_calls.is_empty() => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments },
                    })
                })
                .collect();
            json!({ "role": "assistant", "tool_calls": calls })
        }
        role => json!({ "role": role_to_cohere(role), "content": message.text }),
    }
}
