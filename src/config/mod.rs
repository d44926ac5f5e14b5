pub mod validation;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::protocol::canonical::Vendor;

use self::validation::validate_config;

/// Per-vendor connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VendorConfig {
    /// Overrides the built-in endpoint when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Explicit credential; falls back to the vendor's environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Engine configuration, loaded from YAML with environment fallback for
/// credentials. Owned by the caller; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Bounded by the client's connect+read deadlines; kept as a distinct
    /// knob so callers can tighten uploads independently if a transport
    /// grows per-phase control.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: u32,
    /// Number of trailing messages (beyond the system message) sent upstream.
    #[serde(default = "default_context_size")]
    pub context_size: usize,
    #[serde(default)]
    pub vendors: std::collections::BTreeMap<String, VendorConfig>,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_read_timeout() -> u64 {
    120
}
fn default_write_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_max_call_depth() -> u32 {
    20
}
fn default_context_size() -> usize {
    20
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_call_depth: default_max_call_depth(),
            context_size: default_context_size(),
            vendors: std::collections::BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] on malformed YAML or failed validation.
    pub fn from_yaml_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|err| EngineError::Config(format!("failed to parse YAML: {err}")))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] on I/O failure, malformed YAML, or
    /// failed validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| EngineError::Config(format!("failed to read config file: {err}")))?;
        Self::from_yaml_str(&text)
    }

    #[must_use]
    pub fn vendor(&self, vendor: Vendor) -> Option<&VendorConfig> {
        self.vendors.get(vendor.as_str())
    }

    /// Resolve the credential for a vendor: explicit config value first,
    /// then the vendor's environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the vendor requires a key and
    /// none is available. This check runs before any network call.
    pub fn resolve_api_key(&self, vendor: Vendor) -> Result<Option<String>, EngineError> {
        if let Some(key) = self
            .vendor(vendor)
            .and_then(|v| v.api_key.as_deref())
            .filter(|k| !k.is_empty())
        {
            return Ok(Some(key.to_string()));
        }
        if let Ok(key) = std::env::var(vendor.api_key_env()) {
            if !key.is_empty() {
                return Ok(Some(key));
            }
        }
        if vendor.requires_api_key() {
            return Err(EngineError::Config(format!(
                "{} not found; set the {} environment variable or the vendors.{}.api_key config entry",
                vendor.api_key_env(),
                vendor.api_key_env(),
                vendor.as_str(),
            )));
        }
        Ok(None)
    }

    /// Endpoint base URL for a vendor, honoring any configured override.
    #[must_use]
    pub fn base_url(&self, vendor: Vendor) -> String {
        if let Some(url) = self.vendor(vendor).and_then(|v| v.base_url.as_deref()) {
            return url.trim_end_matches('/').to_string();
        }
        default_base_url(vendor).to_string()
    }
}

/// Built-in vendor endpoints.
#[must_use]
pub fn default_base_url(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::OpenAi => "https://api.openai.com/v1",
        Vendor::Anthropic => "https://api.anthropic.com/v1",
        Vendor::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        Vendor::Cohere => "https://api.cohere.com/v2",
        Vendor::DeepSeek => "https://api.deepseek.com",
        Vendor::Mistral => "https://api.mistral.ai/v1",
        Vendor::Grok => "https://api.x.ai/v1",
        Vendor::Perplexity => "https://api.perplexity.ai",
        Vendor::Ollama => "http://localhost:11434/v1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay_ms, 1_000);
        assert_eq!(config.max_call_depth, 20);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.read_timeout_secs, 120);
    }

    #[test]
    fn test_vendor_overrides() {
        let yaml = r"
max_call_depth: 5
vendors:
  openai:
    base_url: https://proxy.internal/v1/
    api_key: sk-test
";
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_call_depth, 5);
        assert_eq!(config.base_url(Vendor::OpenAi), "https://proxy.internal/v1");
        assert_eq!(
            config.resolve_api_key(Vendor::OpenAi).unwrap().as_deref(),
            Some("sk-test")
        );
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = EngineConfig::default();
        std::env::remove_var("XAI_API_KEY");
        let err = config.resolve_api_key(Vendor::Grok).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = EngineConfig::default();
        std::env::remove_var("OLLAMA_API_KEY");
        assert!(config.resolve_api_key(Vendor::Ollama).unwrap().is_none());
    }

    #[test]
    fn test_default_endpoints_parse() {
        for vendor in Vendor::ALL {
            assert!(url::Url::parse(default_base_url(vendor)).is_ok());
        }
    }
}
