//! Outbound HTTP with timeout, bounded retry, and cancellation.

mod http_transport;
mod retry_policy;

pub use http_transport::HttpTransport;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::protocol::canonical::Vendor;

/// One HTTP attempt's worth of request data; constructed fresh per attempt
/// by cloning the body, discarded after the response arrives.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub vendor: Vendor,
    pub method: http::Method,
    pub url: String,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

impl PendingRequest {
    #[must_use]
    pub fn post_json(vendor: Vendor, url: String, headers: http::HeaderMap, body: &Value) -> Self {
        let body = serde_json::to_vec(body).map_or_else(|_| Bytes::new(), Bytes::from);
        Self {
            vendor,
            method: http::Method::POST,
            url,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn get(vendor: Vendor, url: String, headers: http::HeaderMap) -> Self {
        Self {
            vendor,
            method: http::Method::GET,
            url,
            headers,
            body: Bytes::new(),
        }
    }
}

/// Open response body delivered as a pull-based chunk stream. The next
/// network read is not issued until the caller asks for it, which is what
/// gives the decoder natural backpressure.
pub struct StreamHandle {
    pub status: u16,
    chunks: BoxStream<'static, Result<Bytes, EngineError>>,
}

impl StreamHandle {
    #[must_use]
    pub fn new(status: u16, chunks: BoxStream<'static, Result<Bytes, EngineError>>) -> Self {
        Self { status, chunks }
    }

    /// Convenience constructor for tests and buffered bodies.
    #[must_use]
    pub fn from_bytes(status: u16, body: Bytes) -> Self {
        Self {
            status,
            chunks: futures_util::stream::iter([Ok(body)]).boxed(),
        }
    }

    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, EngineError>> {
        self.chunks.next().await
    }

    /// Drain the remaining body into one buffer.
    ///
    /// # Errors
    ///
    /// Propagates the first read error from the underlying stream.
    pub async fn collect(mut self) -> Result<Bytes, EngineError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Seam between the orchestration loop and the network.
///
/// The production implementation is [`HttpTransport`]; tests script failures
/// and canned bodies behind the same interface.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send a request, applying the retry policy internally.
    ///
    /// # Errors
    ///
    /// [`EngineError::Network`] after retries are exhausted on network-level
    /// failure, [`EngineError::Protocol`] when the last response carried a
    /// non-success status, [`EngineError::Cancelled`] when the token fires.
    async fn send(
        &self,
        request: PendingRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle, EngineError>;
}

/// Pull a uniform error message out of a vendor error body.
///
/// Vendors disagree on shape: OpenAI/Gemini/Anthropic nest under `error`,
/// Cohere uses a bare `message`, and some surfaces return a plain string.
#[must_use]
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(err) = json.get("error") {
            if let Some(msg) = err.get("message").and_then(Value::as_str) {
                return msg.to_string();
            }
            if let Some(msg) = err.as_str() {
                return msg.to_string();
            }
        }
        if let Some(msg) = json.get("message").and_then(Value::as_str) {
            return msg.to_string();
        }
        if let Some(msg) = json.get("detail").and_then(Value::as_str) {
            return msg.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("upstream returned status {status}")
    } else {
        let mut msg = trimmed.chars().take(300).collect::<String>();
        if msg.len() < trimmed.len() {
            msg.push('…');
        }
        msg
    }
}
