/// Canonical error type used across all modules.
///
/// The taxonomy splits into *terminal* kinds that end the current turn
/// (configuration, network, protocol, cancellation) and *graceful* kinds the
/// engine degrades around so the conversation can still produce an answer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Upstream error: status={status}, message={message}")]
    Protocol { status: u16, message: String },
    #[error("Frame parse error: {0}")]
    Parse(String),
    #[error("Tool argument error: {0}")]
    ToolArgument(String),
    #[error("Tool execution error: {0}")]
    ToolExecution(String),
    #[error("Maximum call depth of {max} exceeded")]
    DepthExceeded { max: u32 },
    #[error("Turn cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether this error ends the turn.
    ///
    /// Parse, tool-argument, and tool-execution failures are absorbed by the
    /// orchestration loop; depth exhaustion surfaces as a terminal notice
    /// rather than a propagated error.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::Network(_)
                | EngineError::Protocol { .. }
                | EngineError::Cancelled
        )
    }

    /// Message formatted for the presentation sink, with the severity
    /// prefixes the UI layer keys off.
    #[must_use]
    pub fn sink_message(&self) -> String {
        match self {
            EngineError::Config(msg) => format!("CONFIGURATION ERROR: {msg}"),
            EngineError::Network(msg) => format!("HTTP ERROR: {msg}"),
            EngineError::Protocol { message, .. } => format!("API ERROR: {message}"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kinds() {
        assert!(EngineError::Config("missing key".into()).is_terminal());
        assert!(EngineError::Network("timed out".into()).is_terminal());
        assert!(EngineError::Protocol {
            status: 429,
            message: "rate limited".into()
        }
        .is_terminal());
        assert!(EngineError::Cancelled.is_terminal());
    }

    #[test]
    fn test_graceful_kinds() {
        assert!(!EngineError::Parse("bad frame".into()).is_terminal());
        assert!(!EngineError::ToolArgument("bad args".into()).is_terminal());
        assert!(!EngineError::ToolExecution("boom".into()).is_terminal());
        assert!(!EngineError::DepthExceeded { max: 20 }.is_terminal());
    }

    #[test]
    fn test_sink_message_prefixes() {
        let err = EngineError::Protocol {
            status: 500,
            message: "internal".into(),
        };
        assert_eq!(err.sink_message(), "API ERROR: internal");
        assert_eq!(
            EngineError::Network("timed out".into()).sink_message(),
            "HTTP ERROR: timed out"
        );
    }
}
