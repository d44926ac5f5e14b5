pub mod catalog;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod providers;
pub mod stream;
pub mod tools;
pub mod transport;

pub(crate) mod json_scan;

pub use crate::catalog::ModelCatalog;
pub use crate::config::EngineConfig;
pub use crate::conversation::{Attachment, ConversationContext, Message, Role};
pub use crate::engine::sink::{ChannelSink, EventSink, NullSink, SinkEvent};
pub use crate::engine::{ChatEngine, TurnOptions};
pub use crate::error::EngineError;
pub use crate::protocol::canonical::{
    FinishReason, StreamEvent, ToolChoice, ToolSpec, TurnResult, Usage, Vendor,
};
pub use crate::tools::{ToolHandler, ToolRegistry};
