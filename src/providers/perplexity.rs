//! Perplexity dialect: the Chat Completions frame shape plus a top-level
//! `citations` array of source URLs. The array grows as the answer streams;
//! only the final set is emitted, once, ahead of the finish event.

use serde_json::Value;

use crate::error::EngineError;
use crate::protocol::canonical::{StreamEvent, Vendor};
use crate::stream::RawFrame;

use super::openai::{self, OpenAiCompatAdapter};
use super::{ParseState, TurnRequest, VendorAdapter};

pub struct PerplexityAdapter;

impl VendorAdapter for PerplexityAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Perplexity
    }

    fn endpoint(&self, base_url: &str, _model: &str, _api_key: Option<&str>) -> String {
        format!("{base_url}/chat/completions")
    }

    fn headers(&self, api_key: Option<&str>) -> Result<http::HeaderMap, EngineError> {
        OpenAiCompatAdapter::new(Vendor::Perplexity).headers(api_key)
    }

    fn build_request(&self, request: &TurnRequest<'_>) -> Value {
        OpenAiCompatAdapter::new(Vendor::Perplexity).build_request(request)
    }

    fn parse_frame(&self, state: &mut ParseState, frame: &RawFrame, out: &mut Vec<StreamEvent>) {
        if let Some(citations) = frame.json.get("citations").and_then(Value::as_array) {
            state.citations = citations
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        let mut inner = Vec::new();
        openai::parse_chat_frame(state, &frame.json, &mut inner);

        for event in inner {
            if matches!(event, StreamEvent::Finish(_)) && !state.citations.is_empty() {
                out.push(StreamEvent::Citation {
                    sources: std::mem::take(&mut state.citations),
                });
            }
            out.push(event);
        }
    }
}
