//! Anthropic Messages dialect. System text is top-level, tool results travel
//! as `tool_result` blocks inside user messages, and the stream is typed SSE
//! with per-block start/delta/stop events.

use base64::Engine as _;
use serde_json::{json, Value};

use crate::conversation::{Message, Role};
use crate::error::EngineError;
use crate::protocol::canonical::{StreamEvent, ToolChoice, Usage, Vendor};
use crate::protocol::mapping::{anthropic_finish_to_canonical, role_to_anthropic};
use crate::stream::RawFrame;

use super::{header_map, BlockKind, ParseState, TurnRequest, VendorAdapter};

const API_VERSION: &str = "2023-06-01";
/// The Messages API requires `max_tokens`; used when the caller sets none.
const DEFAULT_MAX_TOKENS: u32 = 4_096;

pub struct AnthropicAdapter;

impl VendorAdapter for AnthropicAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    fn endpoint(&self, base_url: &str, _model: &str, _api_key: Option<&str>) -> String {
        format!("{base_url}/messages")
    }

    fn headers(&self, api_key: Option<&str>) -> Result<http::HeaderMap, EngineError> {
        header_map(&[
            ("content-type", "application/json".to_string()),
            ("accept", "text/event-stream".to_string()),
            ("anthropic-version", API_VERSION.to_string()),
            ("x-api-key", api_key.unwrap_or_default().to_string()),
        ])
    }

    fn build_request(&self, request: &TurnRequest<'_>) -> Value {
        let mut system = String::new();
        let mut messages: Vec<Value> = Vec::new();

        for message in request.messages {
            if message.role == Role::System {
                system = message.text.clone();
                continue;
            }
            let role = role_to_anthropic(message.role);
            let blocks = encode_blocks(message);
            // Alternation is required; consecutive same-role entries (for
            // example several tool results) merge into one message.
            match messages.last_mut() {
                Some(prev) if prev["role"] == role => {
                    if let Some(content) = prev["content"].as_array_mut() {
                        content.extend(blocks);
                    }
                }
                _ => messages.push(json!({ "role": role, "content": blocks })),
            }
        }

        let mut body = json!({
            "model": request.model,
            "system": system,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
            body["tool_choice"] = match request.tool_choice {
                ToolChoice::Auto => json!({ "type": "auto" }),
                ToolChoice::None => json!({ "type": "none" }),
                ToolChoice::Required => json!({ "type": "any" }),
                ToolChoice::Specific(name) => json!({ "type": "tool", "name": name }),
            };
        }

        body
    }

    fn parse_frame(&self, state: &mut ParseState, frame: &RawFrame, out: &mut Vec<StreamEvent>) {
        let json = &frame.json;
        let kind = frame
            .event
            .as_deref()
            .or_else(|| json.get("type").and_then(Value::as_str))
            .unwrap_or_default();

        match kind {
            "message_start" => {
                if let Some(tokens) = json
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    out.push(StreamEvent::Usage(Usage {
                        input_tokens: Some(tokens),
                        output_tokens: None,
                    }));
                }
            }
            "content_block_start" => {
                let index = json.get("index").and_then(Value::as_u64).unwrap_or(0);
                let block = &json["content_block"];
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") => {
                        let id = block
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let name = block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        state.blocks.insert(index, BlockKind::ToolUse { id: id.clone() });
                        state.track_start(&id);
                        out.push(StreamEvent::ToolCallStart { id, name });
                    }
                    Some("thinking" | "redacted_thinking") => {
                        state.blocks.insert(index, BlockKind::Thinking);
                    }
                    _ => {
                        state.blocks.insert(index, BlockKind::Text);
                    }
                }
            }
            "content_block_delta" => {
                let index = json.get("index").and_then(Value::as_u64).unwrap_or(0);
                let delta = &json["delta"];
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            out.push(StreamEvent::TextDelta(text.to_string()));
                        }
                    }
                    Some("thinking_delta") => {
                        if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                            out.push(StreamEvent::ThinkingDelta(text.to_string()));
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(fragment) = delta.get("partial_json").and_then(Value::as_str) {
                            if let Some(BlockKind::ToolUse { id }) = state.blocks.get(&index) {
                                if !fragment.is_empty() {
                                    out.push(StreamEvent::ToolCallArgDelta {
                                        id: id.clone(),
                                        fragment: fragment.to_string(),
                                    });
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                let index = json.get("index").and_then(Value::as_u64).unwrap_or(0);
                if let Some(BlockKind::ToolUse { id }) = state.blocks.remove(&index) {
                    state.close(&id, out);
                }
            }
            "message_delta" => {
                if let Some(tokens) = json
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                {
                    out.push(StreamEvent::Usage(Usage {
                        input_tokens: None,
                        output_tokens: Some(tokens),
                    }));
                }
                if let Some(reason) = json
                    .pointer("/delta/stop_reason")
                    .and_then(Value::as_str)
                {
                    state.close_all(out);
                    out.push(StreamEvent::Finish(anthropic_finish_to_canonical(reason)));
                }
            }
            "error" => {
                let message = json
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("upstream stream error")
                    .to_string();
                out.push(StreamEvent::StreamError { message });
            }
            // ping, message_stop
            _ => {}
        }
    }
}

fn encode_blocks(message: &Message) -> Vec<Value> {
    if message.role == Role::Tool {
        return vec![json!({
            "type": "tool_result",
            "tool_use_id": message.tool_call_id.as_deref().unwrap_or_default(),
            "content": message.text,
        })];
    }

    let mut blocks = Vec::new();
    if !message.text.is_empty() {
        blocks.push(json!({ "type": "text", "text": message.text }));
    }
    for attachment in &message.attachments {
        let data = base64::engine::general_purpose::STANDARD.encode(&attachment.data);
        let block_type = if attachment.is_pdf() { "document" } else { "image" };
        blocks.push(json!({
            "type": block_type,
            "source": {
                "type": "base64",
                "media_type": attachment.media_type,
                "data": data,
            }
        }));
    }
    for call in &message.tool_calls {
        let input: Value =
            serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": input,
        }));
    }
    if blocks.is_empty() {
        blocks.push(json!({ "type": "text", "text": "" }));
    }
    blocks
}
