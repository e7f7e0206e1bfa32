use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use omnigate_common::{Logger, TracingLogger};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};

use crate::account::Account;
use crate::config::ProviderConfig;
use crate::context::DispatchContext;
use crate::envelope::ChannelMessage;
use crate::errors::BifrostError;
use crate::events::{Event, EventHub, FallbackEngagedEvent, OperationalEvent, ProviderUnavailableEvent, ProviderUpdatedEvent, RetryExhaustedEvent};
use crate::key;
use crate::plugin::{self, Plugin};
use crate::pool::Pool;
use crate::provider_adapter::{ProviderAdapter, StreamReceiver};
use crate::registry::{ProviderEntry, ProviderRegistry};
use crate::request::{BifrostRequest, RequestKind};
use crate::response::{BifrostResponse, ExtraFields, StreamChunk};
use crate::retry::{self, AttemptOutcome};
use crate::worker;

pub type AdapterFactory = Arc<dyn Fn() -> Arc<dyn ProviderAdapter> + Send + Sync>;

/// Everything needed to build a `Dispatcher`: one struct an embedding
/// application builds once at startup and hands to the engine.
pub struct BifrostConfig {
    pub account: Arc<dyn Account>,
    /// One adapter factory per provider key the account can report. A
    /// factory is called once per worker at pool-creation time so each
    /// worker gets its own adapter instance: launching `Concurrency`
    /// workers, each owning one provider adapter instance.
    pub adapters: HashMap<String, AdapterFactory>,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub logger: Arc<dyn Logger>,
    pub initial_pool_size: usize,
    pub event_buffer: usize,
    /// Engine-wide backpressure override: when `true`, a full provider queue
    /// is always dropped rather than blocked on, regardless of what the
    /// provider's own `BackpressurePolicy` says. Per-provider `Drop` still
    /// applies when this is `false`.
    pub drop_excess_requests: bool,
    /// An MCP tool manager (or any other `Plugin` an embedding application
    /// wants unconditionally active), appended after `plugins` so its
    /// pre/post hooks run last on the way in and first on the way out.
    pub mcp_config: Option<Arc<dyn Plugin>>,
}

impl Default for BifrostConfig {
    fn default() -> Self {
        Self {
            account: Arc::new(crate::account::EmptyAccount),
            adapters: HashMap::new(),
            plugins: Vec::new(),
            logger: Arc::new(TracingLogger),
            initial_pool_size: 16,
            event_buffer: 256,
            drop_excess_requests: false,
            mcp_config: None,
        }
    }
}

/// The request dispatch engine: validates, runs the plugin pipeline,
/// enqueues onto the target provider's bounded worker pool, awaits the
/// reply, and walks the fallback chain on failure.
pub struct Dispatcher {
    account: Arc<dyn Account>,
    adapters: HashMap<String, AdapterFactory>,
    plugins: Vec<Arc<dyn Plugin>>,
    logger: Arc<dyn Logger>,
    registry: ProviderRegistry,
    pool: Pool<ChannelMessage>,
    /// Serializes the lazy-create-then-publish sequence in
    /// `resolve_provider_entry` so two concurrent first dispatches to the
    /// same provider can't each spin up their own worker pool. Never held
    /// across a provider call; only around registry cold-start.
    init_lock: AsyncMutex<()>,
    drop_excess_requests: bool,
    pub events: EventHub,
}

impl Dispatcher {
    pub fn new(config: BifrostConfig) -> Self {
        let pool_size = config.initial_pool_size;
        let mut plugins = config.plugins;
        if let Some(mcp) = config.mcp_config {
            plugins.push(mcp);
        }
        Self {
            account: config.account,
            adapters: config.adapters,
            plugins,
            logger: config.logger,
            registry: ProviderRegistry::new(),
            pool: Pool::new(pool_size, pool_size.max(16), ChannelMessage::new, ChannelMessage::reset),
            init_lock: AsyncMutex::new(()),
            drop_excess_requests: config.drop_excess_requests,
            events: EventHub::new(config.event_buffer.max(1)),
        }
    }

    pub async fn text_completion(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.dispatch(ctx, request).await
    }

    pub async fn chat_completion(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.dispatch(ctx, request).await
    }

    pub async fn responses(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.dispatch(ctx, request).await
    }

    pub async fn embedding(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.dispatch(ctx, request).await
    }

    pub async fn speech(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.dispatch(ctx, request).await
    }

    pub async fn transcription(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.dispatch(ctx, request).await
    }

    pub async fn text_completion_stream(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<StreamReceiver, BifrostError> {
        self.dispatch_stream(ctx, request).await
    }

    pub async fn chat_completion_stream(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<StreamReceiver, BifrostError> {
        self.dispatch_stream(ctx, request).await
    }

    pub async fn responses_stream(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<StreamReceiver, BifrostError> {
        self.dispatch_stream(ctx, request).await
    }

    /// Validate, try the primary, short-circuit on cancellation,
    /// otherwise walk `request.fallbacks` in order and return the
    /// *primary*'s error if every provider failed.
    pub async fn dispatch(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        validate(&request)?;

        let primary = self.attempt(&ctx, request.clone()).await;
        match &primary {
            Ok(_) => return primary,
            Err(err) if err.is_cancelled() => return primary,
            Err(_) => {}
        }

        for fallback in &request.fallbacks {
            if self
                .account
                .config_for_provider(&fallback.provider)
                .await
                .is_err()
            {
                self.logger.warn(
                    "fallback provider has no account config, skipping",
                    &[("provider", &fallback.provider)],
                );
                continue;
            }

            self.events
                .emit(Event::Operational(OperationalEvent::FallbackEngaged(
                    FallbackEngagedEvent {
                        at: SystemTime::now(),
                        from_provider: request.provider.clone(),
                        from_model: request.model.clone(),
                        to_provider: fallback.provider.clone(),
                        to_model: fallback.model.clone(),
                    },
                )))
                .await;

            let fallback_request = request.for_fallback(fallback);
            let outcome = self.attempt(&ctx, fallback_request).await;
            match &outcome {
                Ok(_) => return outcome,
                Err(err) if err.is_cancelled() => return outcome,
                Err(_) => continue,
            }
        }

        primary
    }

    pub async fn dispatch_stream(
        &self,
        ctx: DispatchContext,
        request: BifrostRequest,
    ) -> Result<StreamReceiver, BifrostError> {
        validate(&request)?;

        let primary = self.attempt_stream(&ctx, request.clone()).await;
        match primary {
            Ok(rx) => return Ok(rx),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(primary_err) => {
                for fallback in &request.fallbacks {
                    if self
                        .account
                        .config_for_provider(&fallback.provider)
                        .await
                        .is_err()
                    {
                        continue;
                    }
                    let fallback_request = request.for_fallback(fallback);
                    match self.attempt_stream(&ctx, fallback_request).await {
                        Ok(rx) => return Ok(rx),
                        Err(err) if err.is_cancelled() => return Err(err),
                        Err(_) => continue,
                    }
                }
                Err(primary_err)
            }
        }
    }

    /// The single-provider attempt path. Every exit releases the
    /// checked-out envelope exactly once via `EnvelopeGuard`'s `Drop`.
    async fn attempt(
        &self,
        ctx: &DispatchContext,
        request: BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        let start = Instant::now();
        let provider = request.provider.clone();
        let model = request.model.clone();
        let kind = request.kind();
        let entry = self.resolve_provider_entry(&provider).await?;

        let (executed, pre_result) = plugin::run_pre_hooks(&self.plugins, ctx, request).await;
        let outcome = match pre_result {
            Err(mut short_circuit) => {
                short_circuit.extra.provider = provider.clone();
                short_circuit.extra.model_requested = model.clone();
                short_circuit.extra.request_type = kind;
                Ok(short_circuit)
            }
            Ok(request) => {
                self.enqueue_and_await(ctx, &entry, request, provider.clone(), model.clone(), start)
                    .await
            }
        };

        if let Err(err) = &outcome
            && !err.is_bifrost_error
            && !err.is_cancelled()
        {
            self.events
                .emit(Event::Operational(OperationalEvent::RetryExhausted(
                    RetryExhaustedEvent {
                        at: SystemTime::now(),
                        provider,
                        model,
                        attempts: entry.config.network.max_retries + 1,
                        error_message: err.error.message.clone(),
                    },
                )))
                .await;
        }

        plugin::run_post_hooks(&self.plugins, executed, ctx, outcome).await
    }

    async fn enqueue_and_await(
        &self,
        ctx: &DispatchContext,
        entry: &Arc<ProviderEntry>,
        request: BifrostRequest,
        provider: String,
        model: String,
        start: Instant,
    ) -> Result<BifrostResponse, BifrostError> {
        let kind = request.kind();
        let mut guard = EnvelopeGuard::checkout(&self.pool);
        guard.configure(request, ctx.clone());
        let reply_rx = guard.take_reply_receiver();
        let queued = guard.into_queued();

        if let Err(err) = self.try_enqueue(ctx, entry, queued).await {
            return Err(err);
        }

        let result = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(BifrostError::cancelled()),
            reply = reply_rx => match reply {
                Ok(reply) => reply,
                Err(_) => Err(BifrostError::internal("provider worker dropped the reply channel")),
            },
        };

        // The engine, not the adapter, is the sole authority on `ExtraFields`:
        // every response the caller sees must carry the provider/model/kind
        // that were actually dispatched, regardless of what an adapter set.
        result.map(|mut response| {
            response.extra.provider = provider;
            response.extra.model_requested = model;
            response.extra.request_type = kind;
            response.extra.latency = start.elapsed();
            response
        })
    }

    /// Non-blocking send first; on a full queue, honor the caller's
    /// cancellation state and the provider's backpressure policy before
    /// falling back to a cancellation-aware blocking send.
    async fn try_enqueue(
        &self,
        ctx: &DispatchContext,
        entry: &Arc<ProviderEntry>,
        queued: crate::envelope::QueuedMessage,
    ) -> Result<(), BifrostError> {
        let queued = match entry.sender.try_send(queued) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(BifrostError::internal("provider queue is closed"));
            }
            Err(mpsc::error::TrySendError::Full(queued)) => queued,
        };

        if ctx.is_cancelled() {
            return Err(BifrostError::cancelled());
        }
        if self.drop_excess_requests || entry.config.backpressure == crate::config::BackpressurePolicy::Drop {
            return Err(BifrostError::internal("request dropped: queue is full"));
        }

        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(BifrostError::cancelled()),
            result = entry.sender.send(queued) => {
                result.map_err(|_| BifrostError::internal("provider queue is closed"))
            }
        }
    }

    async fn attempt_stream(
        &self,
        ctx: &DispatchContext,
        request: BifrostRequest,
    ) -> Result<StreamReceiver, BifrostError> {
        let entry = self.resolve_provider_entry(&request.provider).await?;
        let provider = request.provider.clone();
        let model = request.model.clone();
        let kind = request.kind();

        let (executed, pre_result) = plugin::run_pre_hooks(&self.plugins, ctx, request).await;
        let request = match pre_result {
            Err(short_circuit) => {
                let (tx, rx) = mpsc::channel(1);
                let runner = PostHookRunner {
                    plugins: self.plugins.clone(),
                    executed,
                    ctx: ctx.clone(),
                    provider,
                    model,
                    kind,
                };
                let chunk = StreamChunk {
                    delta: short_circuit.body,
                    done: true,
                };
                let processed = runner.run_chunk(Ok(chunk)).await;
                let _ = tx.send(processed).await;
                return Ok(rx);
            }
            Ok(request) => request,
        };

        let keys = if entry.config.keyless {
            Vec::new()
        } else {
            self.account
                .keys_for_provider(ctx, &request.provider)
                .await
                .map_err(|err| BifrostError::internal(err.to_string()))?
        };

        let factory = self.adapter_factory(&request.provider)?;
        let adapter = factory();
        let keyless = entry.config.keyless;
        let network = entry.config.network.clone();

        let outcome = retry::run_with_retry(&network, &ctx.cancellation, || {
            let keys = &keys;
            let adapter = &adapter;
            let request = &request;
            async move {
                let key = if keyless {
                    None
                } else {
                    Some(
                        key::select_key(keys, &request.model)
                            .map_err(|err| BifrostError::internal(err.to_string()))?,
                    )
                };
                adapter.stream(ctx, key, request).await
            }
        })
        .await;

        let mut raw_rx = match outcome {
            AttemptOutcome::Completed(result) => result?,
            AttemptOutcome::Cancelled => return Err(BifrostError::cancelled()),
        };

        let (tx, rx) = mpsc::channel(entry.config.concurrency_and_buffer_size.buffer_size.max(1));
        let runner = PostHookRunner {
            plugins: self.plugins.clone(),
            executed,
            ctx: ctx.clone(),
            provider: request.provider.clone(),
            model: request.model.clone(),
            kind: request.kind(),
        };
        let cancellation = ctx.cancellation.clone();
        tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => {
                        let _ = tx.send(Err(BifrostError::cancelled())).await;
                        break;
                    }
                    chunk = raw_rx.recv() => match chunk {
                        Some(chunk) => chunk,
                        None => break,
                    },
                };
                let done = matches!(&chunk, Ok(c) if c.done) || chunk.is_err();
                let processed = runner.run_chunk(chunk).await;
                if tx.send(processed).await.is_err() || done {
                    break;
                }
            }
        });

        Ok(rx)
    }

    /// Resolve a provider's worker pool, creating it lazily on first
    /// use. Double-checked under `init_lock` so two racing first-dispatches
    /// to the same provider never spin up two pools.
    async fn resolve_provider_entry(&self, provider: &str) -> Result<Arc<ProviderEntry>, BifrostError> {
        if let Some(entry) = self.registry.get(provider) {
            return Ok(entry);
        }

        let _guard = self.init_lock.lock().await;
        if let Some(entry) = self.registry.get(provider) {
            return Ok(entry);
        }

        let config = self
            .account
            .config_for_provider(provider)
            .await
            .map_err(|err| BifrostError::internal(err.to_string()))?;

        if !config.keyless {
            let keys = self
                .account
                .keys_for_provider(&DispatchContext::new("pool-init"), provider)
                .await
                .map_err(|err| BifrostError::internal(err.to_string()))?;
            if keys.is_empty() {
                self.events
                    .emit(Event::Operational(OperationalEvent::ProviderUnavailable(
                        ProviderUnavailableEvent {
                            at: SystemTime::now(),
                            provider: provider.to_string(),
                            reason: "provider requires keys and none are configured".to_string(),
                        },
                    )))
                    .await;
                return Err(BifrostError::internal(format!(
                    "provider {provider} requires keys and none are configured"
                )));
            }
        }

        let factory = self.adapter_factory(provider)?;
        let entry = Arc::new(worker::spawn_provider(
            provider.to_string(),
            config,
            self.account.clone(),
            factory,
        ));
        self.registry.insert(provider.to_string(), entry.clone());
        Ok(entry)
    }

    fn adapter_factory(&self, provider: &str) -> Result<AdapterFactory, BifrostError> {
        self.adapters
            .get(provider)
            .cloned()
            .ok_or_else(|| BifrostError::internal(format!("no provider adapter registered for {provider}")))
    }

    /// Always publishes a brand new queue + worker set. Workers bound
    /// to the replaced `Arc<ProviderEntry>` finish their
    /// current message against the old adapter instance and then exit once
    /// the old queue closes (the last `Arc` drops once no in-flight attempt
    /// still references it) — no explicit drain is needed.
    pub async fn update_provider(&self, provider: &str, config: ProviderConfig) -> Result<(), BifrostError> {
        let factory = self.adapter_factory(provider)?;
        let entry = Arc::new(worker::spawn_provider(
            provider.to_string(),
            config,
            self.account.clone(),
            factory,
        ));
        self.registry.insert(provider.to_string(), entry);
        self.events
            .emit(Event::Operational(OperationalEvent::ProviderUpdated(
                ProviderUpdatedEvent {
                    at: SystemTime::now(),
                    provider: provider.to_string(),
                },
            )))
            .await;
        Ok(())
    }

    /// Close every provider queue, join its workers, then run
    /// every plugin's best-effort `cleanup` hook. An embedding application
    /// that registers an MCP manager as a `Plugin` gets MCP teardown for
    /// free here, too.
    pub async fn shutdown(&self) {
        let snapshot = self.registry.snapshot();
        for provider in snapshot.keys().cloned().collect::<Vec<_>>() {
            let Some(entry) = self.registry.remove(&provider) else {
                continue;
            };
            match Arc::try_unwrap(entry) {
                Ok(entry) => {
                    drop(entry.sender);
                    for handle in entry.workers {
                        let _ = handle.await;
                    }
                }
                Err(entry) => {
                    // Some in-flight attempt still holds this Arc; don't let
                    // shutdown block on it indefinitely.
                    worker::shutdown_entry(entry).await;
                }
            }
        }

        for plugin in &self.plugins {
            plugin.cleanup().await;
        }
    }
}

/// Reject malformed requests before they ever reach a
/// provider. Never retried, never fallen back over.
fn validate(request: &BifrostRequest) -> Result<(), BifrostError> {
    if request.provider.is_empty() {
        return Err(BifrostError::validation("provider must not be empty"));
    }
    if request.model.is_empty() {
        return Err(BifrostError::validation("model must not be empty"));
    }
    Ok(())
}

/// Owns a pooled `ChannelMessage` for the lifetime of one attempt and
/// releases it back to the pool on drop, so every exit path — including an
/// early return or a panic unwinding through `enqueue_and_await` — releases
/// the envelope exactly once.
struct EnvelopeGuard<'a> {
    pool: &'a Pool<ChannelMessage>,
    message: Option<ChannelMessage>,
}

impl<'a> EnvelopeGuard<'a> {
    fn checkout(pool: &'a Pool<ChannelMessage>) -> Self {
        let mut message = pool.checkout();
        message.reset();
        Self {
            pool,
            message: Some(message),
        }
    }

    fn configure(&mut self, request: BifrostRequest, ctx: DispatchContext) {
        self.message
            .as_mut()
            .expect("envelope taken before configure")
            .configure(request, ctx);
    }

    fn take_reply_receiver(&mut self) -> oneshot::Receiver<crate::envelope::DispatchReply> {
        self.message
            .as_mut()
            .expect("envelope taken before take_reply_receiver")
            .take_reply_receiver()
    }

    fn into_queued(&mut self) -> crate::envelope::QueuedMessage {
        self.message
            .as_mut()
            .expect("envelope taken before into_queued")
            .into_queued()
    }
}

impl Drop for EnvelopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            self.pool.release(message);
        }
    }
}

/// Hands streamed chunks through the same reverse `PostHook` chain that a
/// non-streaming reply gets, one chunk at a time. The provider adapter is
/// oblivious to this; the dispatcher interposes it between the adapter's
/// raw channel and the one the caller reads.
struct PostHookRunner {
    plugins: Vec<Arc<dyn Plugin>>,
    executed: usize,
    ctx: DispatchContext,
    provider: String,
    model: String,
    kind: RequestKind,
}

impl PostHookRunner {
    async fn run_chunk(
        &self,
        chunk: Result<StreamChunk, BifrostError>,
    ) -> Result<StreamChunk, BifrostError> {
        let done = matches!(&chunk, Ok(c) if c.done) || chunk.is_err();
        let outcome = chunk.map(|c| BifrostResponse {
            id: None,
            body: c.delta,
            usage: None,
            raw: None,
            extra: ExtraFields {
                provider: self.provider.clone(),
                model_requested: self.model.clone(),
                request_type: self.kind,
                latency: std::time::Duration::ZERO,
            },
        });
        let processed = plugin::run_post_hooks(&self.plugins, self.executed, &self.ctx, outcome).await;
        processed.map(|response| StreamChunk {
            delta: response.body,
            done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountError;
    use crate::config::{BackpressurePolicy, ConcurrencyAndBufferSize, NetworkConfig};
    use crate::key::Key;
    use crate::request::{Fallback, RequestInput};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct StaticAccount {
        configs: HashMap<String, ProviderConfig>,
        keys: HashMap<String, Vec<Key>>,
    }

    #[async_trait]
    impl Account for StaticAccount {
        fn configured_providers(&self) -> Vec<String> {
            self.configs.keys().cloned().collect()
        }

        async fn config_for_provider(&self, provider: &str) -> Result<ProviderConfig, AccountError> {
            self.configs
                .get(provider)
                .cloned()
                .ok_or_else(|| AccountError::ProviderNotConfigured(provider.to_string()))
        }

        async fn keys_for_provider(
            &self,
            _ctx: &DispatchContext,
            provider: &str,
        ) -> Result<Vec<Key>, AccountError> {
            Ok(self.keys.get(provider).cloned().unwrap_or_default())
        }
    }

    fn fast_network() -> NetworkConfig {
        NetworkConfig {
            default_request_timeout_in_seconds: 5,
            max_retries: 2,
            retry_backoff_initial_ms: 1,
            retry_backoff_max_ms: 2,
            base_url: None,
            extra_headers: Vec::new(),
        }
    }

    fn provider_config() -> ProviderConfig {
        ProviderConfig {
            network: fast_network(),
            concurrency_and_buffer_size: ConcurrencyAndBufferSize {
                concurrency: 1,
                buffer_size: 4,
            },
            backpressure: BackpressurePolicy::Block,
            keyless: false,
        }
    }

    struct ScriptedAdapter {
        script: Mutex<Vec<Result<BifrostResponse, BifrostError>>>,
        calls: AtomicU32,
    }

    fn ok_response() -> BifrostResponse {
        BifrostResponse {
            id: Some("r1".into()),
            body: crate::response::ResponseBody::ChatCompletion { choices: vec![] },
            usage: None,
            raw: None,
            extra: ExtraFields {
                provider: String::new(),
                model_requested: String::new(),
                request_type: RequestKind::ChatCompletion,
                latency: std::time::Duration::ZERO,
            },
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn provider_key(&self) -> &str {
            "mock"
        }

        async fn chat_completion(
            &self,
            _ctx: &DispatchContext,
            _key: Option<&Key>,
            _request: &BifrostRequest,
        ) -> Result<BifrostResponse, BifrostError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(BifrostError::internal("script exhausted"));
            }
            script.remove(0)
        }
    }

    fn chat_request(provider: &str, model: &str) -> BifrostRequest {
        BifrostRequest {
            provider: provider.to_string(),
            model: model.to_string(),
            input: RequestInput::ChatCompletion { messages: vec![] },
            params: None,
            fallbacks: vec![],
        }
    }

    #[tokio::test]
    async fn immediate_success_invokes_adapter_once() {
        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config());
        let mut keys = HashMap::new();
        keys.insert("openai".to_string(), vec![Key::new("k1", vec!["gpt-4o".to_string()])]);
        let account = StaticAccount { configs, keys };

        let adapter = Arc::new(ScriptedAdapter {
            script: Mutex::new(vec![Ok(ok_response())]),
            calls: AtomicU32::new(0),
        });
        let factory: AdapterFactory = {
            let adapter = adapter.clone();
            Arc::new(move || adapter.clone() as Arc<dyn ProviderAdapter>)
        };
        let mut adapters = HashMap::new();
        adapters.insert("openai".to_string(), factory);
        let dispatcher = Dispatcher::new(BifrostConfig {
            account: Arc::new(account),
            adapters,
            plugins: vec![],
            logger: Arc::new(TracingLogger),
            initial_pool_size: 2,
            event_buffer: 16,
            drop_excess_requests: false,
            mcp_config: None,
        });

        let response = dispatcher
            .chat_completion(DispatchContext::new("t1"), chat_request("openai", "gpt-4o"))
            .await
            .expect("dispatch should succeed");

        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.extra.provider, "openai");
        assert_eq!(response.extra.request_type, RequestKind::ChatCompletion);
    }

    #[tokio::test]
    async fn validation_errors_never_reach_the_adapter() {
        let dispatcher = Dispatcher::new(BifrostConfig::default());
        let err = dispatcher
            .chat_completion(
                DispatchContext::new("t1"),
                BifrostRequest {
                    provider: String::new(),
                    model: "gpt-4o".into(),
                    input: RequestInput::ChatCompletion { messages: vec![] },
                    params: None,
                    fallbacks: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(!err.is_bifrost_error);
        assert_eq!(err.r#type, Some(crate::errors::ErrorType::Validation));
    }

    #[tokio::test]
    async fn fallback_is_tried_after_primary_fails_and_wins() {
        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config());
        configs.insert("anthropic".to_string(), provider_config());
        let mut keys = HashMap::new();
        keys.insert("openai".to_string(), vec![Key::new("k1", vec!["gpt-4o".to_string()])]);
        keys.insert(
            "anthropic".to_string(),
            vec![Key::new("k2", vec!["claude-3-5-sonnet".to_string()])],
        );
        let account = StaticAccount { configs, keys };

        let primary = Arc::new(ScriptedAdapter {
            script: Mutex::new(vec![
                Err(BifrostError::provider(Some(400), "bad request")),
            ]),
            calls: AtomicU32::new(0),
        });
        let fallback = Arc::new(ScriptedAdapter {
            script: Mutex::new(vec![Ok(ok_response())]),
            calls: AtomicU32::new(0),
        });

        let mut adapters: HashMap<String, AdapterFactory> = HashMap::new();
        adapters.insert("openai".to_string(), {
            let primary = primary.clone();
            Arc::new(move || primary.clone() as Arc<dyn ProviderAdapter>)
        });
        adapters.insert("anthropic".to_string(), {
            let fallback = fallback.clone();
            Arc::new(move || fallback.clone() as Arc<dyn ProviderAdapter>)
        });

        let dispatcher = Dispatcher::new(BifrostConfig {
            account: Arc::new(account),
            adapters,
            plugins: vec![],
            logger: Arc::new(TracingLogger),
            initial_pool_size: 2,
            event_buffer: 16,
            drop_excess_requests: false,
            mcp_config: None,
        });

        let mut request = chat_request("openai", "gpt-4o");
        request.fallbacks.push(Fallback {
            provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet".to_string(),
        });

        let response = dispatcher
            .chat_completion(DispatchContext::new("t1"), request)
            .await
            .expect("fallback should succeed");

        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.extra.provider, "anthropic");
    }

    #[tokio::test]
    async fn exhausted_fallbacks_return_the_primary_error() {
        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config());
        configs.insert("anthropic".to_string(), provider_config());
        let mut keys = HashMap::new();
        keys.insert("openai".to_string(), vec![Key::new("k1", vec!["gpt-4o".to_string()])]);
        keys.insert(
            "anthropic".to_string(),
            vec![Key::new("k2", vec!["claude-3-5-sonnet".to_string()])],
        );
        let account = StaticAccount { configs, keys };

        let primary = Arc::new(ScriptedAdapter {
            script: Mutex::new(vec![Err(BifrostError::provider(Some(401), "primary unauthorized"))]),
            calls: AtomicU32::new(0),
        });
        let fallback = Arc::new(ScriptedAdapter {
            script: Mutex::new(vec![Err(BifrostError::provider(Some(401), "fallback unauthorized"))]),
            calls: AtomicU32::new(0),
        });

        let mut adapters: HashMap<String, AdapterFactory> = HashMap::new();
        adapters.insert("openai".to_string(), {
            let primary = primary.clone();
            Arc::new(move || primary.clone() as Arc<dyn ProviderAdapter>)
        });
        adapters.insert("anthropic".to_string(), {
            let fallback = fallback.clone();
            Arc::new(move || fallback.clone() as Arc<dyn ProviderAdapter>)
        });

        let dispatcher = Dispatcher::new(BifrostConfig {
            account: Arc::new(account),
            adapters,
            plugins: vec![],
            logger: Arc::new(TracingLogger),
            initial_pool_size: 2,
            event_buffer: 16,
            drop_excess_requests: false,
            mcp_config: None,
        });

        let mut request = chat_request("openai", "gpt-4o");
        request.fallbacks.push(Fallback {
            provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet".to_string(),
        });

        let err = dispatcher
            .chat_completion(DispatchContext::new("t1"), request)
            .await
            .unwrap_err();

        assert_eq!(err.error.message, "primary unauthorized");
    }

    #[tokio::test]
    async fn cancellation_short_circuits_fallback_traversal() {
        let mut configs = HashMap::new();
        configs.insert("openai".to_string(), provider_config());
        let mut keys = HashMap::new();
        keys.insert("openai".to_string(), vec![Key::new("k1", vec!["gpt-4o".to_string()])]);
        let account = StaticAccount { configs, keys };

        let primary = Arc::new(ScriptedAdapter {
            script: Mutex::new(vec![Err(BifrostError::cancelled())]),
            calls: AtomicU32::new(0),
        });
        let mut adapters: HashMap<String, AdapterFactory> = HashMap::new();
        adapters.insert("openai".to_string(), {
            let primary = primary.clone();
            Arc::new(move || primary.clone() as Arc<dyn ProviderAdapter>)
        });

        let dispatcher = Dispatcher::new(BifrostConfig {
            account: Arc::new(account),
            adapters,
            plugins: vec![],
            logger: Arc::new(TracingLogger),
            initial_pool_size: 2,
            event_buffer: 16,
            drop_excess_requests: false,
            mcp_config: None,
        });

        let mut request = chat_request("openai", "gpt-4o");
        request.fallbacks.push(Fallback {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
        });

        let err = dispatcher
            .chat_completion(DispatchContext::new("t1"), request)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }
}
