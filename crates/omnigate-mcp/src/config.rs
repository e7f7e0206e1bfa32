use serde::{Deserialize, Serialize};

/// How an MCP client's transport reaches its server.
///
/// `Sse` and `Http` both speak streamable-HTTP under the hood (the pack only
/// carries rmcp's `transport-streamable-http-client-reqwest` feature, which
/// already multiplexes SSE framing); what differs is the connection's
/// lifetime policy, see [`ClientEntry::connect`](crate::client::ClientEntry::connect).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ClientTransport {
    Http {
        url: String,
        #[serde(default)]
        headers: Vec<(String, String)>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: Vec<(String, String)>,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: Vec<(String, String)>,
    },
    /// Wired directly to tools the embedding application registers with the
    /// manager at construction time, see [`crate::client::LocalToolServer`].
    InProcess,
}

/// Which of a client's tools the dispatch engine is allowed to advertise and
/// execute. `None` denies all of the client's tools; `Some(["*"])` allows
/// all of them; any other list is a tool-name allowlist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub tools_to_execute: Option<Vec<String>>,
}

impl ExecutionConfig {
    pub fn deny_all() -> Self {
        Self {
            tools_to_execute: None,
        }
    }

    pub fn allow_all() -> Self {
        Self {
            tools_to_execute: Some(vec!["*".to_string()]),
        }
    }

    pub fn allow(tools: Vec<String>) -> Self {
        Self {
            tools_to_execute: Some(tools),
        }
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        match &self.tools_to_execute {
            None => false,
            Some(list) => list.iter().any(|t| t == "*" || t == tool_name),
        }
    }
}

/// Everything needed to stand up a new client via [`crate::manager::McpManager::add_client`].
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub name: String,
    pub transport: ClientTransport,
    pub execution: ExecutionConfig,
}

/// In-place mutation applied by [`crate::manager::McpManager::edit_client`].
#[derive(Debug, Clone, Default)]
pub struct ClientEdit {
    pub execution: Option<ExecutionConfig>,
}

pub(crate) fn context_allows_client(filter: Option<&[String]>, client_id: &str) -> bool {
    match filter {
        None => true,
        Some(list) if list.is_empty() => false,
        Some(list) => list.iter().any(|c| c == "*" || c == client_id),
    }
}

pub(crate) fn context_allows_tool(filter: Option<&[String]>, client_id: &str, tool: &str) -> bool {
    match filter {
        None => true,
        Some(list) if list.is_empty() => false,
        Some(list) => list.iter().any(|t| {
            t == "*" || t == &format!("{client_id}/{tool}") || t == &format!("{client_id}/*")
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_config_deny_all_blocks_everything() {
        let cfg = ExecutionConfig::deny_all();
        assert!(!cfg.allows("search"));
    }

    #[test]
    fn execution_config_allow_all_matches_any_name() {
        let cfg = ExecutionConfig::allow_all();
        assert!(cfg.allows("search"));
        assert!(cfg.allows("anything"));
    }

    #[test]
    fn execution_config_allowlist_matches_only_named_tools() {
        let cfg = ExecutionConfig::allow(vec!["search".to_string()]);
        assert!(cfg.allows("search"));
        assert!(!cfg.allows("delete"));
    }

    #[test]
    fn context_filters_use_absent_empty_wildcard_semantics() {
        assert!(context_allows_client(None, "docs"));
        assert!(!context_allows_client(Some(&[]), "docs"));
        assert!(context_allows_client(Some(&["docs".to_string()]), "docs"));
        assert!(!context_allows_client(Some(&["docs".to_string()]), "other"));

        assert!(context_allows_tool(None, "docs", "search"));
        assert!(!context_allows_tool(Some(&[]), "docs", "search"));
        assert!(context_allows_tool(
            Some(&["docs/search".to_string()]),
            "docs",
            "search"
        ));
        assert!(context_allows_tool(
            Some(&["docs/*".to_string()]),
            "docs",
            "anything"
        ));
        assert!(!context_allows_tool(
            Some(&["docs/search".to_string()]),
            "docs",
            "delete"
        ));
    }
}
