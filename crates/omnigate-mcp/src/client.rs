use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::transport::streamable_http_client::{
    StreamableHttpClientTransport, StreamableHttpClientTransportConfig,
};
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientSpec, ClientTransport, ExecutionConfig};
use crate::error::McpError;

/// Bound on the transport-init + MCP `initialize` round trip. SSE clients
/// skip this because their connection is meant to outlive any one call, see
/// [`ClientEntry::connect`].
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool handler the embedding application registers directly, bypassing
/// the wire protocol entirely for [`ClientTransport::InProcess`] clients.
#[async_trait]
pub trait LocalToolServer: Send + Sync {
    fn tools(&self) -> Vec<ToolSchema>;
    async fn call(&self, name: &str, arguments: Value) -> Result<Value, McpError>;
}

enum Conn {
    Remote(RunningService<RoleClient, ()>),
    InProcess(Arc<dyn LocalToolServer>),
}

pub struct ClientEntry {
    pub name: String,
    pub execution: RwLock<ExecutionConfig>,
    pub tool_map: RwLock<HashMap<String, ToolSchema>>,
    transport: ClientTransport,
    in_process: Option<Arc<dyn LocalToolServer>>,
    conn: RwLock<Option<Conn>>,
    cancel: CancellationToken,
}

impl ClientEntry {
    pub fn new(spec: ClientSpec) -> Self {
        Self {
            name: spec.name,
            execution: RwLock::new(spec.execution),
            tool_map: RwLock::new(HashMap::new()),
            transport: spec.transport,
            in_process: None,
            conn: RwLock::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn new_in_process(name: String, execution: ExecutionConfig, server: Arc<dyn LocalToolServer>) -> Self {
        Self {
            name,
            execution: RwLock::new(execution),
            tool_map: RwLock::new(HashMap::new()),
            transport: ClientTransport::InProcess,
            in_process: Some(server),
            conn: RwLock::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        // best-effort; a blocking_read would deadlock inside async contexts
        self.conn.try_read().map(|g| g.is_some()).unwrap_or(true)
    }

    /// Two-phase connect: build the transport, then run the MCP `initialize`
    /// handshake via `rmcp::ServiceExt::serve`. Idempotent once connected.
    ///
    /// `Http` and `Stdio` bound the whole handshake at [`CONNECT_TIMEOUT`].
    /// `Sse` is meant to be a long-lived session, so it connects without a
    /// deadline and instead owns `self.cancel` for the life of the client.
    pub async fn connect(&self) -> Result<(), McpError> {
        if self.conn.read().await.is_some() {
            return Ok(());
        }

        let conn = match &self.transport {
            ClientTransport::Stdio { command, args, env } => {
                let mut cmd = Command::new(command);
                cmd.args(args);
                for (key, value) in env {
                    cmd.env(key, value);
                }
                let transport = TokioChildProcess::new(cmd)
                    .map_err(|err| McpError::Transport(err.to_string()))?;
                let service = with_connect_timeout(().serve(transport)).await?;
                Conn::Remote(service)
            }
            ClientTransport::Http { url, headers } => {
                let client = build_http_client(headers)?;
                let config = StreamableHttpClientTransportConfig::with_uri(url.clone());
                let transport = StreamableHttpClientTransport::with_client(client, config);
                let service = with_connect_timeout(().serve(transport)).await?;
                Conn::Remote(service)
            }
            ClientTransport::Sse { url, headers } => {
                let client = build_http_client(headers)?;
                let config = StreamableHttpClientTransportConfig::with_uri(url.clone());
                let transport = StreamableHttpClientTransport::with_client(client, config);
                let service = ().serve(transport).await.map_err(|err| McpError::Connection(err.to_string()))?;
                Conn::Remote(service)
            }
            ClientTransport::InProcess => {
                let server = self
                    .in_process
                    .clone()
                    .ok_or_else(|| McpError::Config(format!("client {:?} has no in-process registry", self.name)))?;
                Conn::InProcess(server)
            }
        };

        *self.conn.write().await = Some(conn);
        Ok(())
    }

    /// Fetches `ListTools` (or the in-process registry's tool list) and
    /// replaces the cached tool map wholesale.
    pub async fn list_tools(&self) -> Result<(), McpError> {
        self.connect().await?;
        let guard = self.conn.read().await;
        let tools = match guard.as_ref().expect("connect populates conn") {
            Conn::Remote(service) => {
                let result = service
                    .list_tools(Default::default())
                    .await
                    .map_err(|err| McpError::Protocol(err.to_string()))?;
                result
                    .tools
                    .into_iter()
                    .map(|tool| ToolSchema {
                        name: tool.name.to_string(),
                        description: tool
                            .description
                            .map(|d| d.to_string())
                            .unwrap_or_default(),
                        input_schema: serde_json::to_value(&*tool.input_schema)
                            .unwrap_or(Value::Object(Default::default())),
                    })
                    .collect::<Vec<_>>()
            }
            Conn::InProcess(server) => server.tools(),
        };
        drop(guard);

        let mut map = self.tool_map.write().await;
        map.clear();
        for tool in tools {
            map.insert(tool.name.clone(), tool);
        }
        Ok(())
    }

    /// Invokes one tool and collapses its result content into a single
    /// string, suitable for a synthetic `tool`-role chat message.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String, McpError> {
        let guard = self.conn.read().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| McpError::Connection(format!("client {:?} is not connected", self.name)))?;
        match conn {
            Conn::Remote(service) => {
                let params = CallToolRequestParam {
                    name: tool_name.to_string().into(),
                    arguments: arguments.as_object().cloned(),
                };
                let result = service
                    .call_tool(params)
                    .await
                    .map_err(|err| McpError::ToolExecution(err.to_string()))?;
                Ok(collapse_content(result))
            }
            Conn::InProcess(server) => {
                let value = server.call(tool_name, arguments).await?;
                Ok(collapse_value(value))
            }
        }
    }

    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(conn) = self.conn.write().await.take() {
            if let Conn::Remote(service) = conn {
                let _ = service.cancel().await;
            }
        }
        self.tool_map.write().await.clear();
    }

    pub async fn apply_execution(&self, execution: ExecutionConfig) {
        *self.execution.write().await = execution;
    }
}

async fn with_connect_timeout<E: std::fmt::Display>(
    future: impl std::future::Future<Output = Result<RunningService<RoleClient, ()>, E>>,
) -> Result<RunningService<RoleClient, ()>, McpError> {
    tokio::time::timeout(CONNECT_TIMEOUT, future)
        .await
        .map_err(|_| McpError::ConnectTimeout(CONNECT_TIMEOUT))?
        .map_err(|err| McpError::Connection(err.to_string()))
}

fn build_http_client(headers: &[(String, String)]) -> Result<reqwest::Client, McpError> {
    let mut map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| McpError::Config(err.to_string()))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|err| McpError::Config(err.to_string()))?;
        map.insert(name, value);
    }
    reqwest::Client::builder()
        .default_headers(map)
        .build()
        .map_err(|err| McpError::Config(err.to_string()))
}

/// Turns a `CallToolResult` into plain text: text parts are concatenated,
/// everything else gets a placeholder. Serializing through `Value` first
/// (rather than matching rmcp's content enum directly) keeps this stable
/// across the content-type variants the protocol can return.
fn collapse_content(result: rmcp::model::CallToolResult) -> String {
    collapse_value(serde_json::to_value(&result).unwrap_or(Value::Null))
}

fn collapse_value(value: Value) -> String {
    let content = value
        .get("content")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();
    if content.is_empty() {
        return value.to_string();
    }
    content
        .into_iter()
        .map(|item| {
            if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                text.to_string()
            } else {
                let kind = item.get("type").and_then(|t| t.as_str()).unwrap_or("unknown");
                format!("[{kind} content omitted]")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_value_concatenates_text_parts() {
        let value = serde_json::json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"},
            ]
        });
        assert_eq!(collapse_value(value), "first\nsecond");
    }

    #[test]
    fn collapse_value_placeholders_non_text_parts() {
        let value = serde_json::json!({
            "content": [
                {"type": "image", "data": "..."},
            ]
        });
        assert_eq!(collapse_value(value), "[image content omitted]");
    }

    #[test]
    fn collapse_value_falls_back_to_raw_json_when_contentless() {
        let value = serde_json::json!({"isError": false});
        assert_eq!(collapse_value(value.clone()), value.to_string());
    }
}
