use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_request_timeout_in_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_initial")]
    pub retry_backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub retry_backoff_max_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_headers: Vec<(String, String)>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_initial() -> u64 {
    500
}

fn default_backoff_max() -> u64 {
    20_000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_request_timeout_in_seconds: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_initial_ms: default_backoff_initial(),
            retry_backoff_max_ms: default_backoff_max(),
            base_url: None,
            extra_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyAndBufferSize {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_concurrency() -> usize {
    4
}

fn default_buffer_size() -> usize {
    64
}

impl Default for ConcurrencyAndBufferSize {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Whether a full queue should block the caller or fail the request immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    #[default]
    Block,
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub network: NetworkConfig,
    pub concurrency_and_buffer_size: ConcurrencyAndBufferSize,
    #[serde(default)]
    pub backpressure: BackpressurePolicy,
    /// Providers in this allowlist may operate without any configured `Key`.
    #[serde(default)]
    pub keyless: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            concurrency_and_buffer_size: ConcurrencyAndBufferSize::default(),
            backpressure: BackpressurePolicy::default(),
            keyless: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_from_empty_object() {
        let cfg: ProviderConfig = serde_json::from_str(
            r#"{"network":{},"concurrency_and_buffer_size":{}}"#,
        )
        .unwrap();
        assert_eq!(cfg.network.max_retries, 2);
        assert_eq!(cfg.concurrency_and_buffer_size.concurrency, 4);
        assert_eq!(cfg.backpressure, BackpressurePolicy::Block);
    }
}
