use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use omnigate_core::{Account, AccountError, DispatchContext, Key, ProviderConfig};

#[derive(Debug, Clone, Default)]
struct Snapshot {
    configs: HashMap<String, ProviderConfig>,
    keys: HashMap<String, Vec<Key>>,
}

/// In-memory `Account`, built once from a fixed set of provider configs and
/// keys and swappable afterward via [`StaticAccount::replace_configs`] and
/// [`StaticAccount::replace_keys`].
///
/// A single `ArcSwap<Snapshot>` readers load without ever holding a lock;
/// writers replace the whole snapshot at once.
pub struct StaticAccount {
    snapshot: ArcSwap<Snapshot>,
}

impl StaticAccount {
    pub fn new(
        configs: HashMap<String, ProviderConfig>,
        keys: HashMap<String, Vec<Key>>,
    ) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot { configs, keys }),
        }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new(), HashMap::new())
    }

    pub fn replace_configs(&self, configs: HashMap<String, ProviderConfig>) {
        let current = self.snapshot.load();
        self.snapshot.store(Arc::new(Snapshot {
            configs,
            keys: current.keys.clone(),
        }));
    }

    pub fn replace_keys(&self, keys: HashMap<String, Vec<Key>>) {
        let current = self.snapshot.load();
        self.snapshot.store(Arc::new(Snapshot {
            configs: current.configs.clone(),
            keys,
        }));
    }
}

#[async_trait]
impl Account for StaticAccount {
    fn configured_providers(&self) -> Vec<String> {
        self.snapshot.load().configs.keys().cloned().collect()
    }

    async fn config_for_provider(&self, provider: &str) -> Result<ProviderConfig, AccountError> {
        self.snapshot
            .load()
            .configs
            .get(provider)
            .cloned()
            .ok_or_else(|| AccountError::ProviderNotConfigured(provider.to_string()))
    }

    async fn keys_for_provider(
        &self,
        _ctx: &DispatchContext,
        provider: &str,
    ) -> Result<Vec<Key>, AccountError> {
        Ok(self
            .snapshot
            .load()
            .keys
            .get(provider)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_provider_is_an_error() {
        let account = StaticAccount::empty();
        let err = account.config_for_provider("openai").await.unwrap_err();
        assert!(matches!(err, AccountError::ProviderNotConfigured(p) if p == "openai"));
    }

    #[tokio::test]
    async fn replace_configs_is_visible_to_new_readers() {
        let account = StaticAccount::empty();
        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), ProviderConfig::default());
        account.replace_configs(configs);

        assert!(account.config_for_provider("openai").await.is_ok());
        assert_eq!(account.configured_providers(), vec!["openai".to_string()]);
    }

    #[tokio::test]
    async fn keys_for_unconfigured_provider_are_empty_not_an_error() {
        let account = StaticAccount::empty();
        let keys = account
            .keys_for_provider(&DispatchContext::new("t1"), "openai")
            .await
            .unwrap();
        assert!(keys.is_empty());
    }
}
