use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

/// Per-call context threaded through key selection, the provider adapter and
/// the MCP manager. Cloning is cheap; the cancellation token is shared.
#[derive(Clone)]
pub struct DispatchContext {
    pub trace_id: String,
    pub cancellation: CancellationToken,
    values: HashMap<String, Vec<String>>,
}

impl DispatchContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            cancellation: CancellationToken::new(),
            values: HashMap::new(),
        }
    }

    pub fn with_values(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.values.insert(key.into(), values);
        self
    }

    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.values.get(key).map(|v| v.as_slice())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            cancellation: self.cancellation.child_token(),
            values: self.values.clone(),
        }
    }
}

/// Context keys the MCP manager reads from `DispatchContext::value`.
pub const MCP_INCLUDE_CLIENTS: &str = "mcp-include-clients";
pub const MCP_INCLUDE_TOOLS: &str = "mcp-include-tools";
