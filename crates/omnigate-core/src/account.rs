use async_trait::async_trait;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::context::DispatchContext;
use crate::key::Key;

#[derive(Debug, Error, Clone)]
pub enum AccountError {
    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),
    #[error("{0}")]
    Other(String),
}

/// Configuration oracle consulted by the dispatcher. Read-only from the
/// engine's point of view; an embedding application owns the write path
/// (e.g. an admin API that edits provider configs or rotates keys).
#[async_trait]
pub trait Account: Send + Sync {
    fn configured_providers(&self) -> Vec<String>;

    async fn config_for_provider(&self, provider: &str) -> Result<ProviderConfig, AccountError>;

    async fn keys_for_provider(
        &self,
        ctx: &DispatchContext,
        provider: &str,
    ) -> Result<Vec<Key>, AccountError>;
}

/// An `Account` with no configured providers. Useful as a placeholder
/// default; any real dispatcher construction overrides it.
pub struct EmptyAccount;

#[async_trait]
impl Account for EmptyAccount {
    fn configured_providers(&self) -> Vec<String> {
        Vec::new()
    }

    async fn config_for_provider(&self, provider: &str) -> Result<ProviderConfig, AccountError> {
        Err(AccountError::ProviderNotConfigured(provider.to_string()))
    }

    async fn keys_for_provider(
        &self,
        _ctx: &DispatchContext,
        provider: &str,
    ) -> Result<Vec<Key>, AccountError> {
        Err(AccountError::ProviderNotConfigured(provider.to_string()))
    }
}
