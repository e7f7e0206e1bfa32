use std::time::{Duration, Instant, SystemTime};

use omnigate_core::{BifrostError, DispatchContext, NetworkConfig};
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpAdapterError {
    #[error("request cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<HttpAdapterError> for BifrostError {
    fn from(err: HttpAdapterError) -> Self {
        match err {
            HttpAdapterError::Cancelled => BifrostError::cancelled(),
            HttpAdapterError::Network(err) => BifrostError::provider(None, err.to_string()),
        }
    }
}

/// Shared plumbing for building a real HTTP-backed `ProviderAdapter`: one
/// `reqwest::Client`, `base_url` resolution, cancellation-aware sends, and
/// upstream-status classification into the engine's `BifrostError` shape.
///
/// This intentionally does not implement `ProviderAdapter` itself — it has
/// no opinion on request/response wire formats. A concrete adapter (e.g. an
/// OpenAI or Anthropic adapter) embeds a `HttpAdapterBase`, builds its own
/// provider-specific JSON body, and calls [`HttpAdapterBase::send`] to get a
/// classified `reqwest::Response` back.
pub struct HttpAdapterBase {
    client: Client,
    default_base_url: &'static str,
}

impl HttpAdapterBase {
    pub fn new(client: Client, default_base_url: &'static str) -> Self {
        Self {
            client,
            default_base_url,
        }
    }

    pub fn base_url<'a>(&self, network: &'a NetworkConfig) -> &'a str {
        network
            .base_url
            .as_deref()
            .unwrap_or(self.default_base_url)
    }

    /// Sends one HTTP request, racing it against `ctx`'s cancellation token
    /// so a caller cancelling mid-flight gets `RequestCancelled` rather than
    /// waiting out the full `reqwest` timeout. On a non-2xx response, reads
    /// the body and turns it into a `BifrostError::provider` carrying the
    /// upstream status code, so `retry::is_retryable` can classify it.
    pub async fn send(
        &self,
        ctx: &DispatchContext,
        network: &NetworkConfig,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, BifrostError> {
        let url = format!("{}{}", self.base_url(network), path);
        let mut request = self
            .client
            .request(method, &url)
            .timeout(Duration::from_secs(network.default_request_timeout_in_seconds));
        for (name, value) in &network.extra_headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let started = Instant::now();
        let response = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => return Err(HttpAdapterError::Cancelled.into()),
            result = request.send() => result.map_err(HttpAdapterError::Network)?,
        };

        let status = response.status();
        let elapsed_ms = started.elapsed().as_millis();
        if status.is_success() {
            tracing::info!(event = "http_adapter_response", %url, status = status.as_u16(), elapsed_ms);
            let bytes = response
                .bytes()
                .await
                .map_err(HttpAdapterError::Network)?;
            return Ok(bytes.to_vec());
        }

        let retry_after = retry_after_seconds(&response);
        let bytes = response
            .bytes()
            .await
            .unwrap_or_default();
        let message = String::from_utf8_lossy(&bytes).to_string();
        tracing::warn!(event = "http_adapter_response", %url, status = status.as_u16(), elapsed_ms, error = %message);

        let message = match (status, retry_after) {
            (StatusCode::TOO_MANY_REQUESTS, Some(seconds)) => {
                format!("rate limit exceeded, retry after {seconds}s: {message}")
            }
            _ => message,
        };
        Err(BifrostError::provider(Some(status.as_u16()), message))
    }
}

fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
    let value = response.headers().get(reqwest::header::RETRY_AFTER)?;
    let value = value.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
        .map(|duration| duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_falls_back_to_default_when_unconfigured() {
        let base = HttpAdapterBase::new(Client::new(), "https://api.openai.com/v1");
        let network = NetworkConfig::default();
        assert_eq!(base.base_url(&network), "https://api.openai.com/v1");
    }

    #[test]
    fn base_url_honors_an_explicit_override() {
        let base = HttpAdapterBase::new(Client::new(), "https://api.openai.com/v1");
        let mut network = NetworkConfig::default();
        network.base_url = Some("https://my-proxy.internal".to_string());
        assert_eq!(base.base_url(&network), "https://my-proxy.internal");
    }
}
