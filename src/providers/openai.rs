//! OpenAI Chat Completions dialect, shared by `DeepSeek`, `Mistral`, `Grok`,
//! and `Ollama`. Per-vendor differences are small: `DeepSeek` streams
//! reasoning as a `reasoning_content` delta, and `Ollama` skips auth.

use base64::Engine as _;
use serde_json::{json, Value};

use crate::conversation::{Message, Role};
use crate::error::EngineError;
use crate::protocol::canonical::{StreamEvent, ToolChoice, Usage, Vendor};
use crate::protocol::mapping::{openai_finish_to_canonical, role_to_openai};
use crate::stream::RawFrame;

use super::{header_map, ParseState, TurnRequest, VendorAdapter};

pub struct OpenAiCompatAdapter {
    vendor: Vendor,
}

impl OpenAiCompatAdapter {
    #[must_use]
    pub fn new(vendor: Vendor) -> Self {
        Self { vendor }
    }
}

impl VendorAdapter for OpenAiCompatAdapter {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn endpoint(&self, base_url: &str, _model: &str, _api_key: Option<&str>) -> String {
        format!("{base_url}/chat/completions")
    }

    fn headers(&self, api_key: Option<&str>) -> Result<http::HeaderMap, EngineError> {
        let mut pairs = vec![
            ("content-type", "application/json".to_string()),
            ("accept", "text/event-stream".to_string()),
        ];
        if let Some(key) = api_key {
            pairs.push(("authorization", format!("Bearer {key}")));
        }
        header_map(&pairs)
    }

    fn build_request(&self, request: &TurnRequest<'_>) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(|m| encode_message(m)).collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
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
            body["tool_choice"] = encode_tool_choice(request.tool_choice);
        }

        body
    }

    fn parse_frame(&self, state: &mut ParseState, frame: &RawFrame, out: &mut Vec<StreamEvent>) {
        parse_chat_frame(state, &frame.json, out);
    }
}

fn encode_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Specific(name) => json!({
            "type": "function",
            "function": { "name": name }
        }),
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
            let mut value = json!({ "role": "assistant", "tool_calls": calls });
            if message.text.is_empty() {
                value["content"] = Value::Null;
            } else {
                value["content"] = json!(message.text);
            }
            value
        }
        Role::User if !message.attachments.is_empty() => {
            let mut parts = vec![json!({ "type": "text", "text": message.text })];
            for attachment in message.attachments.iter().filter(|a| a.is_image()) {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&attachment.data);
                parts.push(json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{};base64,{encoded}", attachment.media_type)
                    }
                }));
            }
            json!({ "role": "user", "content": parts })
        }
        role => json!({ "role": role_to_openai(role), "content": message.text }),
    }
}

/// Normalize one Chat Completions chunk. Shared with the Perplexity adapter,
/// which layers citation handling on top of the same frame shape.
pub(crate) fn parse_chat_frame(state: &mut ParseState, json: &Value, out: &mut Vec<StreamEvent>) {
    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("upstream stream error")
            .to_string();
        out.push(StreamEvent::StreamError { message });
        return;
    }

    if let Some(usage) = json.get("usage").filter(|u| !u.is_null()) {
        out.push(StreamEvent::Usage(Usage {
            input_tokens: usage.get("prompt_tokens").and_then(Value::as_u64),
            output_tokens: usage.get("completion_tokens").and_then(Value::as_u64),
        }));
    }

    let Some(choice) = json.get("choices").and_then(|c| c.get(0)) else {
        return;
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                out.push(StreamEvent::TextDelta(text.to_string()));
            }
        }
        if let Some(thinking) = delta.get("reasoning_content").and_then(Value::as_str) {
            if !thinking.is_empty() {
                out.push(StreamEvent::ThinkingDelta(thinking.to_string()));
            }
        }
        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                parse_tool_call_delta(state, call, out);
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        state.close_all(out);
        out.push(StreamEvent::Finish(openai_finish_to_canonical(reason)));
    }
}

/// One `tool_calls` delta entry. The first entry for an index carries the id
/// and function name; later entries carry only the index and an argument
/// fragment, so the index→id map does the correlation.
fn parse_tool_call_delta(state: &mut ParseState, call: &Value, out: &mut Vec<StreamEvent>) {
    let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);

    if let Some(id) = call.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        let name = call
            .pointer("/function/name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        state.index_ids.insert(index, id.to_string());
        state.track_start(id);
        out.push(StreamEvent::ToolCallStart {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    if let Some(fragment) = call.pointer("/function/arguments").and_then(Value::as_str) {
        if !fragment.is_empty() {
            if let Some(id) = state.index_ids.get(&index) {
                out.push(StreamEvent::ToolCallArgDelta {
                    id: id.clone(),
                    fragment: fragment.to_string(),
                });
            }
        }
    }
}
