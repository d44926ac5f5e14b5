//! Vendor adapters: one request builder and frame parser per wire dialect.
//!
//! Nine vendors collapse onto five dialects. The OpenAI Chat Completions
//! shape covers `DeepSeek`, `Mistral`, `Grok`, and `Ollama` with small
//! per-vendor hooks; Anthropic, Gemini, Cohere, and Perplexity each get
//! their own adapter.

pub mod anthropic;
pub mod cohere;
pub mod gemini;
pub mod openai;
pub mod perplexity;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::conversation::Message;
use crate::error::EngineError;
use crate::protocol::canonical::{StreamEvent, ToolChoice, ToolSpec, Vendor};
use crate::stream::{Framing, RawFrame};

/// Everything an adapter needs to build one outbound request body.
#[derive(Debug)]
pub struct TurnRequest<'a> {
    pub model: &'a str,
    /// Active window, system message first.
    pub messages: &'a [&'a Message],
    pub tools: &'a [ToolSpec],
    pub tool_choice: &'a ToolChoice,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Kind of an Anthropic content block, tracked by stream index.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse { id: String },
}

/// Per-stream parser scratch. One instance per HTTP response; adapters keep
/// no state of their own, so a single adapter serves concurrent streams.
#[derive(Debug, Default)]
pub struct ParseState {
    /// OpenAI dialect: `tool_calls` array index → vendor call id.
    index_ids: FxHashMap<u64, String>,
    /// Anthropic: content block index → block kind.
    blocks: FxHashMap<u64, BlockKind>,
    /// Ids started but not yet ended, in start order.
    open_calls: Vec<String>,
    /// Perplexity: citation URLs seen so far; emitted once at finish.
    citations: Vec<String>,
}

impl ParseState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn track_start(&mut self, id: &str) {
        if !self.open_calls.iter().any(|c| c == id) {
            self.open_calls.push(id.to_string());
        }
    }

    fn close(&mut self, id: &str, out: &mut Vec<StreamEvent>) {
        if let Some(pos) = self.open_calls.iter().position(|c| c == id) {
            self.open_calls.remove(pos);
            out.push(StreamEvent::ToolCallEnd { id: id.to_string() });
        }
    }

    /// Close every still-open call. Dialects without an explicit per-call
    /// terminator rely on this when the finish frame arrives.
    fn close_all(&mut self, out: &mut Vec<StreamEvent>) {
        for id in std::mem::take(&mut self.open_calls) {
            out.push(StreamEvent::ToolCallEnd { id });
        }
    }
}

/// One vendor wire dialect: how to frame, address, authenticate, encode a
/// turn, and normalize inbound frames to canonical events.
pub trait VendorAdapter: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Wire framing of the streaming response body.
    fn framing(&self) -> Framing {
        Framing::SsePrefix
    }

    /// Full URL of the streaming chat endpoint.
    fn endpoint(&self, base_url: &str, model: &str, api_key: Option<&str>) -> String;

    /// Request headers including authentication.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when a credential cannot be encoded
    /// as a header value.
    fn headers(&self, api_key: Option<&str>) -> Result<http::HeaderMap, EngineError>;

    /// Encode a turn into the vendor's request body.
    fn build_request(&self, request: &TurnRequest<'_>) -> Value;

    /// Normalize one decoded frame into canonical events.
    ///
    /// Unknown frame shapes are ignored; a malformed frame never aborts the
    /// stream.
    fn parse_frame(&self, state: &mut ParseState, frame: &RawFrame, out: &mut Vec<StreamEvent>);
}

/// Resolve the adapter for a vendor.
#[must_use]
pub fn adapter_for(vendor: Vendor) -> Box<dyn VendorAdapter> {
    match vendor {
        Vendor::OpenAi | Vendor::DeepSeek | Vendor::Mistral | Vendor::Grok | Vendor::Ollama => {
            Box::new(openai::OpenAiCompatAdapter::new(vendor))
        }
        Vendor::Anthropic => Box::new(anthropic::AnthropicAdapter),
        Vendor::Gemini => Box::new(gemini::GeminiAdapter),
        Vendor::Cohere => Box::new(cohere::CohereAdapter),
        Vendor::Perplexity => Box::new(perplexity::PerplexityAdapter),
    }
}

/// Build a header map from (name, value) pairs, rejecting values that are
/// not valid header text instead of panicking on a bad credential.
pub(crate) fn header_map(
    pairs: &[(&'static str, String)],
) -> Result<http::HeaderMap, EngineError> {
    let mut headers = http::HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let value = http::HeaderValue::from_str(value)
            .map_err(|_| EngineError::Config(format!("invalid value for header '{name}'")))?;
        headers.insert(
            http::header::HeaderName::from_static(name),
            value,
        );
    }
    Ok(headers)
}
