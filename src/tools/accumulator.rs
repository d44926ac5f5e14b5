//! Reassembly of tool-call arguments that arrive fragmented across frames.

use serde_json::{Map, Value};

/// Parse status of one accumulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Accumulating,
    Complete,
    /// Arguments required repair or were defaulted to an empty object.
    ParseFailed,
}

/// One tool call under assembly. Lives for a single orchestration cycle.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: String,
    pub name: String,
    /// Append-only raw argument text, exactly as fragments arrived.
    pub buffer: String,
    /// Materialized on end-of-call; `None` while accumulating.
    pub arguments: Option<Map<String, Value>>,
    pub status: CallStatus,
}

/// Merges argument fragments per call id, in arrival order, and parses the
/// final payload on end-of-call with a best-effort repair ladder.
///
/// Calls are kept in start order so execution order matches the order the
/// model issued them.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PendingCall>,
}

impl ToolCallAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        if self.find(&id).is_some() {
            // Duplicate start frames are vendor noise; keep the first.
            return;
        }
        self.calls.push(PendingCall {
            id,
            name: name.into(),
            buffer: String::new(),
            arguments: None,
            status: CallStatus::Accumulating,
        });
    }

    /// Append one fragment. Fragments for an unknown id open a call lazily
    /// so dialects that omit a distinct start frame still accumulate; the
    /// concatenation itself is exact and order-preserving.
    pub fn push_fragment(&mut self, id: &str, fragment: &str) {
        match self.find_mut(id) {
            Some(call) => call.buffer.push_str(fragment),
            None => {
                tracing::debug!(call_id = id, "argument fragment for unopened call");
                self.calls.push(PendingCall {
                    id: id.to_string(),
                    name: String::new(),
                    buffer: fragment.to_string(),
                    arguments: None,
                    status: CallStatus::Accumulating,
                });
            }
        }
    }

    /// Close a call and materialize its arguments. Never fails: the repair
    /// ladder ends at an empty object with the status marking the downgrade.
    pub fn finish(&mut self, id: &str) {
        let Some(call) = self.find_mut(id) else {
            return;
        };
        if call.status != CallStatus::Accumulating {
            return;
        }
        let (arguments, status) = parse_arguments(&call.buffer);
        if status == CallStatus::ParseFailed {
            tracing::debug!(
                call_id = id,
                tool = call.name.as_str(),
                "tool arguments repaired or defaulted"
            );
        }
        call.arguments = Some(arguments);
        call.status = status;
    }

    /// Close any call still accumulating when the stream ends.
    pub fn finish_all(&mut self) {
        let open: Vec<String> = self
            .calls
            .iter()
            .filter(|c| c.status == CallStatus::Accumulating)
            .map(|c| c.id.clone())
            .collect();
        for id in open {
            self.finish(&id);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in issue order, consuming the accumulator's state.
    #[must_use]
    pub fn take_calls(&mut self) -> Vec<PendingCall> {
        std::mem::take(&mut self.calls)
    }

    fn find(&self, id: &str) -> Option<&PendingCall> {
        self.calls.iter().find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut PendingCall> {
        self.calls.iter_mut().find(|c| c.id == id)
    }
}

/// Repair ladder: strict parse, then first balanced object salvage, then an
/// empty argument set. Always yields some argument value.
fn parse_arguments(buffer: &str) -> (Map<String, Value>, CallStatus) {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return (Map::new(), CallStatus::Complete);
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return (map, CallStatus::Complete);
    }

    if let Some(candidate) = crate::json_scan::first_balanced_object(trimmed) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            return (map, CallStatus::ParseFailed);
        }
    }

    (Map::new(), CallStatus::ParseFailed)
}
