use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::account::Account;
use crate::config::ProviderConfig;
use crate::envelope::QueuedMessage;
use crate::errors::BifrostError;
use crate::key::{self, KeySelectionError};
use crate::provider_adapter::{self, ProviderAdapter};
use crate::registry::ProviderEntry;
use crate::retry::{self, AttemptOutcome};

/// Builds a fresh `ProviderEntry`: a bounded queue of capacity
/// `config.concurrency_and_buffer_size.buffer_size` drained by exactly
/// `concurrency` workers, each owning its own adapter instance.
pub fn spawn_provider(
    provider: String,
    config: ProviderConfig,
    account: Arc<dyn Account>,
    adapter_factory: Arc<dyn Fn() -> Arc<dyn ProviderAdapter> + Send + Sync>,
) -> ProviderEntry {
    let buffer_size = config.concurrency_and_buffer_size.buffer_size;
    let concurrency = config.concurrency_and_buffer_size.concurrency;
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let adapter = adapter_factory();
        let rx = rx.clone();
        let provider = provider.clone();
        let account = account.clone();
        let keyless = config.keyless;
        workers.push(tokio::spawn(run_worker(
            provider, rx, adapter, account, keyless,
        )));
    }

    ProviderEntry {
        config,
        sender: tx,
        workers,
    }
}

async fn run_worker(
    provider: String,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedMessage>>>,
    adapter: Arc<dyn ProviderAdapter>,
    account: Arc<dyn Account>,
    keyless: bool,
) {
    loop {
        let message = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(message) = message else {
            break;
        };

        let result = handle_message(&provider, &message, &adapter, &account, keyless).await;
        // The receiver may already be gone if the dispatcher timed out or was
        // cancelled; dropping the reply silently is correct in that case.
        let _ = message.reply_tx.send(result);
    }

    tracing::debug!(event = "worker_exited", provider = provider.as_str());
}

async fn handle_message(
    provider: &str,
    message: &QueuedMessage,
    adapter: &Arc<dyn ProviderAdapter>,
    account: &Arc<dyn Account>,
    keyless: bool,
) -> Result<crate::response::BifrostResponse, BifrostError> {
    let cancellation = message.context.cancellation.clone();
    if cancellation.is_cancelled() {
        return Err(BifrostError::cancelled());
    }

    let keys = if keyless {
        Vec::new()
    } else {
        match account.keys_for_provider(&message.context, provider).await {
            Ok(keys) => keys,
            Err(err) => return Err(BifrostError::internal(err.to_string())),
        }
    };

    let network = account
        .config_for_provider(provider)
        .await
        .map(|cfg| cfg.network)
        .unwrap_or_default();

    let outcome = retry::run_with_retry(&network, &cancellation, || {
        let keys = &keys;
        async {
            let key = if keyless {
                None
            } else {
                match key::select_key(keys, &message.request.model) {
                    Ok(key) => Some(key),
                    Err(KeySelectionError::NoKeyForModel(model)) => {
                        return Err(BifrostError::internal(format!(
                            "no keys found that support model {model}"
                        )));
                    }
                }
            };
            provider_adapter::invoke(adapter.as_ref(), &message.context, key, &message.request)
                .await
        }
    })
    .await;

    match outcome {
        AttemptOutcome::Completed(result) => result,
        AttemptOutcome::Cancelled => Err(BifrostError::cancelled()),
    }
}

pub async fn shutdown_entry(entry: Arc<ProviderEntry>) {
    drop(entry.sender.clone());
    // Dropping all senders would close the channel; since the dispatcher may
    // still hold one, the registry removal is what actually drops the last
    // sender. Workers exit once `recv()` observes the channel closed.
    for handle in &entry.workers {
        handle.abort();
    }
}

#[allow(dead_code)]
fn _assert_send<T: Send>() {}
#[allow(dead_code)]
fn _assert_cancellation_is_send() {
    _assert_send::<CancellationToken>();
}
