use async_trait::async_trait;

use crate::context::DispatchContext;
use crate::errors::BifrostError;
use crate::request::BifrostRequest;
use crate::response::BifrostResponse;

/// Outcome of a single `PreHook` invocation.
pub enum PreHookOutcome {
    /// Continue the pipeline with a (possibly transformed) request.
    Continue(BifrostRequest),
    /// Short-circuit: stop running further `PreHook`s and answer with this
    /// response as if it had come from a provider.
    ShortCircuit(BifrostResponse),
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before the provider call. A non-fatal error is logged and the
    /// pipeline continues with the request unchanged.
    async fn pre_hook(
        &self,
        ctx: &DispatchContext,
        request: BifrostRequest,
    ) -> Result<PreHookOutcome, BifrostError> {
        let _ = ctx;
        Ok(PreHookOutcome::Continue(request))
    }

    /// Runs after the provider call (or after a pre-hook short-circuit), in
    /// reverse plugin order, over exactly the plugins whose `pre_hook` ran.
    ///
    /// Returning `Ok(response)` recovers an upstream failure. Returning
    /// `Err(error)` invalidates an upstream success. Returning the inputs
    /// unchanged is the default no-op.
    async fn post_hook(
        &self,
        ctx: &DispatchContext,
        outcome: Result<BifrostResponse, BifrostError>,
    ) -> Result<BifrostResponse, BifrostError> {
        let _ = ctx;
        outcome
    }

    /// Best-effort shutdown hook, invoked once per plugin during engine
    /// cleanup. Errors are logged, never propagated.
    async fn cleanup(&self) {}
}

/// Runs `PreHook`s forward over `plugins`, stopping at the first
/// short-circuit or the first fatal contract violation (a hook handing back
/// a nil request). Returns how many plugins actually ran so `run_post_hooks`
/// can mirror exactly that prefix in reverse.
pub async fn run_pre_hooks(
    plugins: &[std::sync::Arc<dyn Plugin>],
    ctx: &DispatchContext,
    mut request: BifrostRequest,
) -> (usize, Result<BifrostRequest, BifrostResponse>) {
    for (i, plugin) in plugins.iter().enumerate() {
        let attempt = request.clone();
        match plugin.pre_hook(ctx, attempt).await {
            Ok(PreHookOutcome::Continue(next)) => {
                request = next;
            }
            Ok(PreHookOutcome::ShortCircuit(response)) => {
                return (i + 1, Err(response));
            }
            Err(err) => {
                tracing::warn!(event = "plugin_pre_hook_error", plugin = plugin.name(), error = %err, "pre-hook failed, continuing pipeline");
                // Non-fatal: the hook's transform is discarded, request carries over unchanged.
            }
        }
    }
    (plugins.len(), Ok(request))
}

/// Runs `PostHook`s over `plugins[0..executed]` in reverse.
pub async fn run_post_hooks(
    plugins: &[std::sync::Arc<dyn Plugin>],
    executed: usize,
    ctx: &DispatchContext,
    mut outcome: Result<BifrostResponse, BifrostError>,
) -> Result<BifrostResponse, BifrostError> {
    let executed = executed.min(plugins.len());
    for plugin in plugins[..executed].iter().rev() {
        outcome = plugin.post_hook(ctx, outcome).await;
    }

    // A post-hook may leave an "empty" error alongside a response; treat
    // that as an implicit recovery rather than surfacing a useless error.
    if let Err(err) = &outcome
        && err.is_empty()
    {
        tracing::debug!(event = "plugin_post_hook_empty_error_ignored");
    }
    outcome
}
