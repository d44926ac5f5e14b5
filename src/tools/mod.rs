//! Tool capability lookup: an explicit name→handler registry resolved at
//! startup, plus the accumulator that reassembles streamed call arguments.

pub mod accumulator;

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::protocol::canonical::ToolSpec;

/// One invocable capability bound by the surrounding application.
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the parsed argument object.
    ///
    /// # Errors
    ///
    /// Implementations report failure as [`EngineError::ToolExecution`]; the
    /// orchestration loop converts it to a plain-text tool result rather
    /// than aborting the turn.
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, EngineError>;
}

impl<F> ToolHandler for F
where
    F: Fn(&Map<String, Value>) -> Result<String, EngineError> + Send + Sync,
{
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, EngineError> {
        self(args)
    }
}

/// Name→handler registry with the matching wire declarations.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: FxHashMap<String, Arc<dyn ToolHandler>>,
    specs: Vec<ToolSpec>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler under the spec's name. Re-registering a name replaces
    /// the previous handler and declaration.
    pub fn register(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) {
        self.specs.retain(|s| s.name != spec.name);
        self.handlers.insert(spec.name.clone(), handler);
        self.specs.push(spec);
    }

    /// Declarations to advertise in the outbound request body.
    #[must_use]
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke a tool by name.
    ///
    /// # Errors
    ///
    /// [`EngineError::ToolExecution`] for an unknown name or a handler
    /// failure.
    pub fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<String, EngineError> {
        let handler = self.handlers.get(name).ok_or_else(|| {
            EngineError::ToolExecution(format!("unknown tool '{name}'"))
        })?;
        handler.invoke(args)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.specs.iter().map(|s| &s.name).collect::<Vec<_>>())
            .finish()
    }
}
