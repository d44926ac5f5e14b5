//! Gemini `generateContent` dialect. The stream is a JSON array of response
//! objects rather than SSE, the credential rides in the query string, and
//! function calls arrive whole in a single frame with no vendor-issued id,
//! so the function name doubles as the call id.

use base64::Engine as _;
use serde_json::{json, Map, Value};

use crate::conversation::{Message, Role};
use crate::error::EngineError;
use crate::protocol::canonical::{StreamEvent, ToolChoice, Usage, Vendor};
use crate::protocol::mapping::{gemini_finish_to_canonical, role_to_gemini};
use crate::stream::{Framing, RawFrame};

use super::{header_map, ParseState, TurnRequest, VendorAdapter};

pub struct GeminiAdapter;

impl VendorAdapter for GeminiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Gemini
    }

    fn framing(&self) -> Framing {
        Framing::JsonStream
    }

    fn endpoint(&self, base_url: &str, model: &str, api_key: Option<&str>) -> String {
        format!(
            "{base_url}/models/{model}:streamGenerateContent?key={}",
            api_key.unwrap_or_default()
        )
    }

    fn headers(&self, _api_key: Option<&str>) -> Result<http::HeaderMap, EngineError> {
        header_map(&[
            ("content-type", "application/json".to_string()),
            ("accept", "application/json".to_string()),
        ])
    }

    fn build_request(&self, request: &TurnRequest<'_>) -> Value {
        let mut system = String::new();
        let mut contents: Vec<Value> = Vec::new();

        for message in request.messages {
            if message.role == Role::System {
                system = message.text.clone();
                continue;
            }
            contents.push(json!({
                "role": role_to_gemini(message.role),
                "parts": encode_parts(message),
            }));
        }

        let mut generation_config = Map::new();
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
        }

        let mut body = json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": contents,
        });
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
            body["toolConfig"] = json!({
                "functionCallingConfig": encode_tool_choice(request.tool_choice)
            });
        }

        body
    }

    fn parse_frame(&self, state: &mut ParseState, frame: &RawFrame, out: &mut Vec<StreamEvent>) {
        let json = &frame.json;

        if let Some(message) = json.pointer("/error/message").and_then(Value::as_str) {
            out.push(StreamEvent::StreamError {
                message: message.to_string(),
            });
            return;
        }

        if let Some(usage) = json.get("usageMetadata") {
            out.push(StreamEvent::Usage(Usage {
                input_tokens: usage.get("promptTokenCount").and_then(Value::as_u64),
                output_tokens: usage.get("candidatesTokenCount").and_then(Value::as_u64),
            }));
        }

        let Some(candidate) = json.get("candidates").and_then(|c| c.get(0)) else {
            return;
        };

        if let Some(parts) = candidate.pointer("/content/parts").and_then(Value::as_array) {
            for part in parts {
                parse_part(state, part, out);
            }
        }

        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            state.close_all(out);
            out.push(StreamEvent::Finish(gemini_finish_to_canonical(reason)));
        }
    }
}

fn encode_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({ "mode": "AUTO" }),
        ToolChoice::None => json!({ "mode": "NONE" }),
        ToolChoice::Required => json!({ "mode": "ANY" }),
        ToolChoice::Specific(name) => json!({
            "mode": "ANY",
            "allowedFunctionNames": [name]
        }),
    }
}

fn encode_parts(message: &Message) -> Vec<Value> {
    if message.role == Role::Tool {
        // The call id is the function name; correlation goes through it.
        return vec![json!({
            "functionResponse": {
                "name": message.tool_name.as_deref().unwrap_or_default(),
                "response": { "content": message.text },
            }
        })];
    }

    let mut parts = Vec::new();
    if !message.text.is_empty() {
        parts.push(json!({ "text": message.text }));
    }
    for attachment in &message.attachments {
        let data = base64::engine::general_purpose::STANDARD.encode(&attachment.data);
        parts.push(json!({
            "inlineData": { "mimeType": attachment.media_type, "data": data }
        }));
    }
    for call in &message.tool_calls {
        let args: Value = serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
        parts.push(json!({
            "functionCall": { "name": call.name, "args": args }
        }));
    }
    if parts.is_empty() {
        parts.push(json!({ "text": "" }));
    }
    parts
}

/// A function call arrives complete in one part; it is replayed through the
/// canonical start/delta/end vocabulary with the serialized `args` object as
/// the single fragment.
fn parse_part(state: &mut ParseState, part: &Value, out: &mut Vec<StreamEvent>) {
    if let Some(call) = part.get("functionCall") {
        let name = call
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
        let fragment = args.to_string();

        state.track_start(&name);
        out.push(StreamEvent::ToolCallStart {
            id: name.clone(),
            name: name.clone(),
        });
        out.push(StreamEvent::ToolCallArgDelta {
            id: name.clone(),
            fragment,
        });
        state.close(&name, out);
        return;
    }

    if let Some(text) = part.get("text").and_then(Value::as_str) {
        if text.is_empty() {
            return;
        }
        if part.get("thought").and_then(Value::as_bool) == Some(true) {
            out.push(StreamEvent::ThinkingDelta(text.to_string()));
        } else {
            out.push(StreamEvent::TextDelta(text.to_string()));
        }
    }
}
