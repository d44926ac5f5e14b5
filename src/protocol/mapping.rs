use super::canonical::FinishReason;
use crate::conversation::Role;

// ---------------------------------------------------------------------------
// Role mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn role_to_openai(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[must_use]
pub fn role_to_anthropic(role: Role) -> &'static str {
    match role {
        // Anthropic has no system role in messages; system is top-level.
        // Tool results travel as user messages carrying tool_result blocks.
        Role::System | Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    }
}

#[must_use]
pub fn role_to_gemini(role: Role) -> &'static str {
    match role {
        // System text goes through systemInstruction, not the contents array.
        Role::System | Role::User => "user",
        Role::Assistant => "model",
        Role::Tool => "function",
    }
}

#[must_use]
pub fn role_to_cohere(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

// ---------------------------------------------------------------------------
// Finish-reason mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn openai_finish_to_canonical(s: &str) -> FinishReason {
    match s {
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::Safety,
        _ => FinishReason::Stop,
    }
}

#[must_use]
pub fn anthropic_finish_to_canonical(s: &str) -> FinishReason {
    match s {
        "tool_use" => FinishReason::ToolCalls,
        "max_tokens" => FinishReason::Length,
        "refusal" => FinishReason::Safety,
        // end_turn, stop_sequence, pause_turn
        _ => FinishReason::Stop,
    }
}

#[must_use]
pub fn gemini_finish_to_canonical(s: &str) -> FinishReason {
    match s {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => FinishReason::Safety,
        "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
        // STOP and anything unrecognized
        _ => FinishReason::Stop,
    }
}

#[must_use]
pub fn cohere_finish_to_canonical(s: &str) -> FinishReason {
    match s {
        "TOOL_CALL" => FinishReason::ToolCalls,
        "MAX_TOKENS" => FinishReason::Length,
        "ERROR" => FinishReason::Error,
        // COMPLETE, STOP_SEQUENCE
        _ => FinishReason::Stop,
    }
}
