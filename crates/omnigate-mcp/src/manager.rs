use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use omnigate_core::{
    BifrostError, BifrostRequest, ChatMessage, DispatchContext, Plugin, PreHookOutcome,
    MCP_INCLUDE_CLIENTS, MCP_INCLUDE_TOOLS,
};
use serde_json::Value;
use tokio::sync::RwLock;

pub use crate::client::LocalToolServer;
use crate::client::{ClientEntry, ToolSchema};
use crate::config::{context_allows_client, context_allows_tool, ClientEdit, ClientSpec};
use crate::error::McpError;

/// A pending tool call as it arrives on a chat message (`function.arguments`
/// is the raw JSON-encoded string providers hand back).
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Owns every MCP client the dispatch engine knows about, behind a single
/// read-write lock over the client map. Lookups and mutations take the lock
/// only long enough to clone an `Arc<ClientEntry>` or swap a map entry; the
/// actual connect/list/call I/O always runs outside it.
pub struct McpManager {
    clients: RwLock<HashMap<String, Arc<ClientEntry>>>,
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpManager {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Registers and connects a new client. Rolls back the placeholder map
    /// entry if the connect or the initial `ListTools` fails. If the client
    /// was removed by a concurrent `remove_client` while the connect was in
    /// flight, the new connection is closed and `RemovedDuringConnect` is
    /// returned rather than silently reinserting it.
    pub async fn add_client(&self, spec: ClientSpec) -> Result<(), McpError> {
        let name = spec.name.clone();
        {
            let clients = self.clients.read().await;
            if clients.contains_key(&name) {
                return Err(McpError::DuplicateClient(name));
            }
        }

        let entry = Arc::new(ClientEntry::new(spec));
        {
            let mut clients = self.clients.write().await;
            if clients.contains_key(&name) {
                return Err(McpError::DuplicateClient(name));
            }
            clients.insert(name.clone(), entry.clone());
        }

        let connect_result = entry.connect().await;

        let still_present = {
            let clients = self.clients.read().await;
            clients
                .get(&name)
                .map(|current| Arc::ptr_eq(current, &entry))
                .unwrap_or(false)
        };
        if !still_present {
            entry.close().await;
            return Err(McpError::RemovedDuringConnect);
        }

        if let Err(err) = connect_result {
            self.clients.write().await.remove(&name);
            return Err(err);
        }

        if let Err(err) = entry.list_tools().await {
            entry.close().await;
            self.clients.write().await.remove(&name);
            return Err(err);
        }

        Ok(())
    }

    /// Registers an in-process client whose tools are plain Rust, bypassing
    /// any wire transport entirely.
    pub async fn add_in_process_client(
        &self,
        name: String,
        execution: crate::config::ExecutionConfig,
        server: Arc<dyn LocalToolServer>,
    ) -> Result<(), McpError> {
        {
            let clients = self.clients.read().await;
            if clients.contains_key(&name) {
                return Err(McpError::DuplicateClient(name));
            }
        }
        let entry = Arc::new(ClientEntry::new_in_process(name.clone(), execution, server));
        entry.list_tools().await?;
        self.clients.write().await.insert(name, entry);
        Ok(())
    }

    pub async fn remove_client(&self, name: &str) -> Result<(), McpError> {
        let entry = self
            .clients
            .write()
            .await
            .remove(name)
            .ok_or_else(|| McpError::UnknownClient(name.to_string()))?;
        entry.close().await;
        Ok(())
    }

    /// Applies an in-place configuration change and re-lists the client's
    /// tools so the change is reflected in the next advertisement.
    pub async fn edit_client(&self, name: &str, edit: ClientEdit) -> Result<(), McpError> {
        let entry = self
            .clients
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::UnknownClient(name.to_string()))?;
        if let Some(execution) = edit.execution {
            entry.apply_execution(execution).await;
        }
        entry.list_tools().await
    }

    pub async fn reconnect_client(&self, name: &str) -> Result<(), McpError> {
        let entry = self
            .clients
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::UnknownClient(name.to_string()))?;
        entry.close().await;
        entry.connect().await?;
        entry.list_tools().await
    }

    /// Closes every client and empties the map. Best-effort: a client that
    /// fails to close cleanly is still dropped from the map.
    pub async fn cleanup(&self) {
        let entries: Vec<_> = self.clients.write().await.drain().map(|(_, v)| v).collect();
        for entry in entries {
            entry.close().await;
        }
    }

    /// Unions the tool schemas visible to `ctx`, after applying the client's
    /// own `tools_to_execute` policy and then the request-level
    /// `mcp-include-clients`/`mcp-include-tools` context filters on top.
    /// When two clients expose the same tool name, the first one found wins.
    pub async fn advertised_tools(&self, ctx: &DispatchContext) -> Vec<ToolSchema> {
        let include_clients = ctx.values(MCP_INCLUDE_CLIENTS);
        let include_tools = ctx.values(MCP_INCLUDE_TOOLS);

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let clients = self.clients.read().await;
        for (client_id, entry) in clients.iter() {
            if !context_allows_client(include_clients, client_id) {
                continue;
            }
            let execution = entry.execution.read().await;
            let tool_map = entry.tool_map.read().await;
            for (tool_name, schema) in tool_map.iter() {
                if !execution.allows(tool_name) {
                    continue;
                }
                if !context_allows_tool(include_tools, client_id, tool_name) {
                    continue;
                }
                if seen.insert(tool_name.clone()) {
                    out.push(schema.clone());
                }
            }
        }
        out
    }

    /// Parses the tool call's JSON arguments, locates the (first, by map
    /// iteration order) client exposing that tool name, invokes it, and
    /// collapses the result into a synthetic `tool`-role chat message.
    pub async fn execute_tool_call(&self, call: ToolCallRequest) -> Result<ChatMessage, McpError> {
        let arguments: Value = serde_json::from_str(&call.arguments)?;
        let entry = self
            .find_client_for_tool(&call.name)
            .await
            .ok_or_else(|| McpError::UnknownTool(call.name.clone()))?;
        let text = entry.call_tool(&call.name, arguments).await?;
        Ok(ChatMessage {
            role: "tool".to_string(),
            content: text,
            tool_call_id: Some(call.id),
            tool_calls: Vec::new(),
        })
    }

    async fn find_client_for_tool(&self, tool_name: &str) -> Option<Arc<ClientEntry>> {
        let clients = self.clients.read().await;
        for entry in clients.values() {
            if entry.tool_map.read().await.contains_key(tool_name) {
                return Some(entry.clone());
            }
        }
        None
    }

    fn merge_tools_into_params(request: &mut BifrostRequest, tools: Vec<ToolSchema>) {
        if tools.is_empty() {
            return;
        }
        let params = request.params.get_or_insert_with(HashMap::new);
        let mut existing = params
            .remove("tools")
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        let existing_names: HashSet<String> = existing
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .collect();
        for tool in tools {
            if existing_names.contains(&tool.name) {
                continue;
            }
            existing.push(serde_json::json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
            }));
        }
        params.insert("tools".to_string(), Value::Array(existing));
    }
}

/// Wiring into the dispatch engine: `BifrostConfig::mcp_config` takes any
/// `Arc<dyn Plugin>`, and the manager's `pre_hook` is how tool advertisements
/// reach the outgoing request without the dispatcher knowing MCP exists.
#[async_trait]
impl Plugin for McpManager {
    fn name(&self) -> &str {
        "mcp-tool-manager"
    }

    async fn pre_hook(
        &self,
        ctx: &DispatchContext,
        mut request: BifrostRequest,
    ) -> Result<PreHookOutcome, BifrostError> {
        let tools = self.advertised_tools(ctx).await;
        Self::merge_tools_into_params(&mut request, tools);
        Ok(PreHookOutcome::Continue(request))
    }

    async fn cleanup(&self) {
        McpManager::cleanup(self).await;
    }
}
