//! Presentation events pushed to the caller while a turn runs.

use crate::protocol::canonical::TurnResult;

/// One presentation event. Emitted in order; `Done` or `Error` is always
/// last for a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Echo of the user input that opened the turn.
    UserEcho { text: String },
    /// A visible text fragment. `first` marks the first fragment of the
    /// turn so callers can clear a spinner.
    Fragment { text: String, first: bool },
    /// A reasoning fragment, when the model streams one.
    Thinking { text: String },
    /// Activity notice while no tokens are flowing ("THINKING",
    /// "CALLING FUNCTIONS").
    Wait { status: String },
    /// Informational notice, for example the depth-limit message.
    SystemInfo { text: String },
    Done { result: TurnResult },
    Error { message: String },
}

/// Receiver for presentation events. Implementations must not block; the
/// engine calls this inline between network reads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SinkEvent);
}

/// Discards everything. Useful when only the returned [`TurnResult`] matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SinkEvent) {}
}

/// Forwards events over an unbounded channel, for callers that render on a
/// separate task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: tokio::sync::mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<SinkEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    // A dropped receiver means the caller stopped rendering; losing
    // presentation events then is fine.
    fn emit(&self, event: SinkEvent) {
        let _ = self.sender.send(event);
    }
}
