use serde::{Deserialize, Serialize};

/// The vendor wire dialect an adapter speaks.
///
/// Nine vendors collapse onto five wire shapes: the OpenAI Chat Completions
/// dialect is shared by `DeepSeek`, `Mistral`, `Grok`, and `Ollama` with
/// small per-vendor hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    OpenAi,
    Anthropic,
    Gemini,
    Cohere,
    DeepSeek,
    Mistral,
    Grok,
    Perplexity,
    Ollama,
}

impl Vendor {
    pub const ALL: [Vendor; 9] = [
        Vendor::OpenAi,
        Vendor::Anthropic,
        Vendor::Gemini,
        Vendor::Cohere,
        Vendor::DeepSeek,
        Vendor::Mistral,
        Vendor::Grok,
        Vendor::Perplexity,
        Vendor::Ollama,
    ];

    /// Stable lowercase name used in config files and log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Anthropic => "anthropic",
            Vendor::Gemini => "gemini",
            Vendor::Cohere => "cohere",
            Vendor::DeepSeek => "deepseek",
            Vendor::Mistral => "mistral",
            Vendor::Grok => "grok",
            Vendor::Perplexity => "perplexity",
            Vendor::Ollama => "ollama",
        }
    }

    /// Environment variable holding the vendor credential.
    #[must_use]
    pub fn api_key_env(self) -> &'static str {
        match self {
            Vendor::OpenAi => "OPENAI_API_KEY",
            Vendor::Anthropic => "ANTHROPIC_API_KEY",
            Vendor::Gemini => "GEMINI_API_KEY",
            Vendor::Cohere => "COHERE_API_KEY",
            Vendor::DeepSeek => "DEEPSEEK_API_KEY",
            Vendor::Mistral => "MISTRAL_API_KEY",
            Vendor::Grok => "XAI_API_KEY",
            Vendor::Perplexity => "PERPLEXITY_API_KEY",
            Vendor::Ollama => "OLLAMA_API_KEY",
        }
    }

    /// Ollama runs locally and needs no credential.
    #[must_use]
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Vendor::Ollama)
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason the model stopped generating, normalized across vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Safety,
    Error,
}

impl FinishReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::Safety => "safety",
            FinishReason::Error => "error",
        }
    }
}

/// A single event in the canonical stream vocabulary.
///
/// Produced by vendor adapters from decoded frames; consumed by the
/// orchestration loop. Text and thinking deltas are forwarded to the
/// presentation sink immediately; tool-call events are buffered in the
/// accumulator until the stream completes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ThinkingDelta(String),
    ToolCallStart { id: String, name: String },
    ToolCallArgDelta { id: String, fragment: String },
    ToolCallEnd { id: String },
    Citation { sources: Vec<String> },
    Finish(FinishReason),
    StreamError { message: String },
    Usage(Usage),
}

/// Token usage reported by the vendor, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl Usage {
    pub fn merge(&mut self, other: Usage) {
        if other.input_tokens.is_some() {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens.is_some() {
            self.output_tokens = other.output_tokens;
        }
    }
}

/// Tool choice directive passed through to the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    Specific(String),
}

/// A tool's declaration as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the argument object.
    pub parameters: serde_json::Value,
}

/// The assembled result of one user turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnResult {
    pub text: String,
    pub thinking: Option<String>,
    pub citations: Vec<String>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}
