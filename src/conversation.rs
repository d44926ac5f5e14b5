use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Canonical message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Binary payload attached to a message. Consumed by the vendor request
/// builder, never mutated.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub data: Bytes,
    pub media_type: String,
}

impl Attachment {
    #[must_use]
    pub fn new(data: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    #[must_use]
    pub fn is_pdf(&self) -> bool {
        self.media_type == "application/pdf"
    }
}

/// A tool call the assistant issued, kept on the assistant message so the
/// vendor-issued id can be echoed back verbatim on resubmission.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    /// Raw argument JSON exactly as accumulated from the stream.
    pub arguments: String,
}

/// One message in the conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Marks membership in the sliding window actually sent to the vendor.
    pub active: bool,
    /// Tool calls requested by this assistant message, if any.
    pub tool_calls: Vec<ToolCallRecord>,
    /// For tool-result messages: the id of the call being answered.
    pub tool_call_id: Option<String>,
    /// For tool-result messages: the tool name (Gemini correlates by name).
    pub tool_name: Option<String>,
}

impl Message {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    #[must_use]
    pub fn user_with_attachments(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let mut msg = Self::plain(Role::User, text);
        msg.attachments = attachments;
        msg
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    /// Assistant message carrying the tool calls the model just issued.
    #[must_use]
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<ToolCallRecord>) -> Self {
        let mut msg = Self::plain(Role::Assistant, text);
        msg.tool_calls = calls;
        msg
    }

    /// One tool-result message per executed call, correlated by the echoed id.
    #[must_use]
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::plain(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg.tool_name = Some(tool_name.into());
        msg
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            attachments: Vec::new(),
            active: false,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }
}

/// Ordered conversation history owned by the caller and mutated by the
/// orchestration loop when appending user input and tool results.
///
/// Invariant: exactly one leading system message. The `active` flags mark
/// the sliding window sent upstream: the system message plus the most
/// recent `context_size + 1` non-system messages.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    messages: Vec<Message>,
    context_size: usize,
}

impl ConversationContext {
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, context_size: usize) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            context_size,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn context_size(&self) -> usize {
        self.context_size
    }

    pub fn push(&mut self, message: Message) {
        debug_assert!(
            message.role != Role::System,
            "system message is fixed at construction"
        );
        self.messages.push(message);
    }

    /// Recompute the `active` flags and return the window to send.
    pub fn mark_active_window(&mut self) -> Vec<&Message> {
        for msg in &mut self.messages {
            msg.active = false;
        }

        let tail_len = self
            .messages
            .len()
            .saturating_sub(1)
            .min(self.context_size + 1);
        let tail_start = self.messages.len() - tail_len;

        self.messages[0].active = true;
        for msg in &mut self.messages[tail_start..] {
            msg.active = true;
        }

        let mut window = Vec::with_capacity(tail_len + 1);
        window.push(&self.messages[0]);
        window.extend(self.messages[tail_start.max(1)..].iter());
        window
    }

    /// Whether the current window would go out without any user message.
    #[must_use]
    pub fn window_has_user_message(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.active && m.role == Role::User)
    }
}
