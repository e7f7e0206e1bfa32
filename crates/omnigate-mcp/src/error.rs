use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("mcp client {0:?} already exists")]
    DuplicateClient(String),
    #[error("mcp client {0:?} not found")]
    UnknownClient(String),
    #[error("client was removed during connection setup")]
    RemovedDuringConnect,
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("tool execution error: {0}")]
    ToolExecution(String),
    #[error("no mcp client exposes tool {0:?}")]
    UnknownTool(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<McpError> for omnigate_core::BifrostError {
    fn from(err: McpError) -> Self {
        omnigate_core::BifrostError::internal(err.to_string())
    }
}
