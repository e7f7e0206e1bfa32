use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ProviderConfig;
use crate::envelope::QueuedMessage;

/// Everything the dispatcher needs to hand a message to a provider's worker
/// pool: the bounded queue and the handles of the workers draining it.
///
/// Replacing a provider (`ProviderRegistry::insert`) swaps in a brand new
/// `ProviderEntry`; workers already holding the old `Arc` finish their
/// current message against it, while anything enqueued after the swap binds
/// to the new entry.
pub struct ProviderEntry {
    pub config: ProviderConfig,
    pub sender: mpsc::Sender<QueuedMessage>,
    pub workers: Vec<JoinHandle<()>>,
}

/// Atomically replaceable provider map. Readers load a snapshot `Arc` and
/// never hold a lock across a provider call, matching the rest of the
/// engine's no-lock-across-IO rule.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: ArcSwap<HashMap<String, Arc<ProviderEntry>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn get(&self, provider: &str) -> Option<Arc<ProviderEntry>> {
        self.entries.load().get(provider).cloned()
    }

    /// Atomically install `entry` for `provider`, replacing whatever was
    /// there. The previous entry's workers are not stopped here; the caller
    /// is responsible for closing its queue once it is fully unreferenced.
    pub fn insert(
        &self,
        provider: String,
        entry: Arc<ProviderEntry>,
    ) -> Option<Arc<ProviderEntry>> {
        let mut replaced = None;
        self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            replaced = next.insert(provider.clone(), entry.clone());
            Arc::new(next)
        });
        replaced
    }

    pub fn remove(&self, provider: &str) -> Option<Arc<ProviderEntry>> {
        let mut removed = None;
        self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            removed = next.remove(provider);
            Arc::new(next)
        });
        removed
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, Arc<ProviderEntry>>> {
        self.entries.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> Arc<ProviderEntry> {
        let (tx, _rx) = mpsc::channel(1);
        Arc::new(ProviderEntry {
            config: ProviderConfig::default(),
            sender: tx,
            workers: Vec::new(),
        })
    }

    #[test]
    fn insert_then_get_round_trips() {
        let registry = ProviderRegistry::new();
        registry.insert("openai".to_string(), entry());
        assert!(registry.get("openai").is_some());
        assert!(registry.get("anthropic").is_none());
    }

    #[test]
    fn insert_replaces_the_previous_entry_atomically() {
        let registry = ProviderRegistry::new();
        registry.insert("openai".to_string(), entry());
        let replaced = registry.insert("openai".to_string(), entry());
        assert!(replaced.is_some());
        assert_eq!(registry.snapshot().len(), 1);
    }
}
