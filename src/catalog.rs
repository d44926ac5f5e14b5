//! Vendor model listings with a per-vendor in-memory cache.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::protocol::canonical::Vendor;
use crate::providers::adapter_for;
use crate::transport::{PendingRequest, Transport};

/// Fetches and caches the chat-capable model ids a vendor advertises.
///
/// The cache is check-then-populate per vendor; a fetch failure caches an
/// empty list so one unreachable vendor does not get re-queried on every
/// lookup. `invalidate` forces a refetch.
pub struct ModelCatalog {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    cache: RwLock<FxHashMap<Vendor, Arc<Vec<String>>>>,
}

impl ModelCatalog {
    #[must_use]
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Model ids for a vendor, from cache when warm.
    pub async fn models(&self, vendor: Vendor, cancel: &CancellationToken) -> Arc<Vec<String>> {
        if let Some(models) = self.cache.read().get(&vendor) {
            return Arc::clone(models);
        }

        let models = match self.fetch(vendor, cancel).await {
            Ok(models) => models,
            Err(err) => {
                tracing::warn!(vendor = %vendor, error = %err, "model listing failed");
                Vec::new()
            }
        };
        let models = Arc::new(models);
        self.cache.write().insert(vendor, Arc::clone(&models));
        models
    }

    pub fn invalidate(&self, vendor: Vendor) {
        self.cache.write().remove(&vendor);
    }

    async fn fetch(
        &self,
        vendor: Vendor,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, EngineError> {
        let api_key = self.config.resolve_api_key(vendor)?;
        let base_url = self.config.base_url(vendor);
        let adapter = adapter_for(vendor);

        let url = if vendor == Vendor::Gemini {
            format!("{base_url}/models?key={}", api_key.as_deref().unwrap_or_default())
        } else {
            format!("{base_url}/models")
        };
        let headers = adapter.headers(api_key.as_deref())?;

        let handle = self
            .transport
            .send(PendingRequest::get(vendor, url, headers), cancel)
            .await?;
        let body = handle.collect().await?;
        let json: Value = serde_json::from_slice(&body)
            .map_err(|err| EngineError::Parse(format!("model listing: {err}")))?;

        Ok(parse_model_list(&json))
    }
}

/// Extract chat-usable model ids from a listing body. OpenAI-shaped vendors
/// nest under `data` with an `id`; Gemini nests under `models` with a
/// `models/`-prefixed `name`. Embedding models are filtered out.
#[must_use]
pub fn parse_model_list(json: &Value) -> Vec<String> {
    let entries = json
        .get("data")
        .or_else(|| json.get("models"))
        .and_then(Value::as_array);
    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            entry
                .get("id")
                .or_else(|| entry.get("name"))
                .and_then(Value::as_str)
        })
        .map(|name| name.strip_prefix("models/").unwrap_or(name).to_string())
        .filter(|name| !name.contains("embed"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_shape() {
        let json = json!({"data":[
            {"id":"gpt-4.1"},
            {"id":"text-embedding-3-small"},
            {"id":"gpt-4o-mini"}
        ]});
        assert_eq!(parse_model_list(&json), vec!["gpt-4.1", "gpt-4o-mini"]);
    }

    #[test]
    fn test_gemini_shape_strips_prefix() {
        let json = json!({"models":[
            {"name":"models/gemini-2.0-flash"},
            {"name":"models/text-embedding-004"}
        ]});
        assert_eq!(parse_model_list(&json), vec!["gemini-2.0-flash"]);
    }

    #[test]
    fn test_unrecognized_shape_is_empty() {
        assert!(parse_model_list(&json!({"ok":true})).is_empty());
    }
}
