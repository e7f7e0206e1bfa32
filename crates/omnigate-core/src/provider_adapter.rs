use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::context::DispatchContext;
use crate::errors::BifrostError;
use crate::key::Key;
use crate::request::BifrostRequest;
use crate::response::{BifrostResponse, StreamChunk};

pub type StreamReceiver = mpsc::Receiver<Result<StreamChunk, BifrostError>>;

/// One remote model provider. A single adapter instance is owned by exactly
/// one worker at a time; the engine never calls two methods on the same
/// instance concurrently.
///
/// Every method defaults to an `unsupported` error so an adapter only has to
/// implement the request kinds it actually serves.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_key(&self) -> &str;

    async fn text_completion(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        _request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        Err(BifrostError::unsupported("text_completion"))
    }

    async fn chat_completion(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        _request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        Err(BifrostError::unsupported("chat_completion"))
    }

    async fn responses(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        _request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        Err(BifrostError::unsupported("responses"))
    }

    async fn embedding(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        _request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        Err(BifrostError::unsupported("embedding"))
    }

    async fn speech(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        _request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        Err(BifrostError::unsupported("speech"))
    }

    async fn transcription(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        _request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        Err(BifrostError::unsupported("transcription"))
    }

    /// Streaming counterpart of `chat_completion`/`responses`/etc. The
    /// returned receiver yields chunks until one arrives with `done = true`.
    async fn stream(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        _request: &BifrostRequest,
    ) -> Result<StreamReceiver, BifrostError> {
        Err(BifrostError::unsupported("stream"))
    }

    async fn list_models(
        &self,
        _ctx: &DispatchContext,
        _keys: &[Key],
    ) -> Result<BifrostResponse, BifrostError> {
        Err(BifrostError::unsupported("list_models"))
    }
}

/// Dispatches a single non-streaming attempt to the method matching
/// `request`'s kind.
pub async fn invoke(
    adapter: &dyn ProviderAdapter,
    ctx: &DispatchContext,
    key: Option<&Key>,
    request: &BifrostRequest,
) -> Result<BifrostResponse, BifrostError> {
    use crate::request::RequestInput::*;
    match &request.input {
        TextCompletion { .. } => adapter.text_completion(ctx, key, request).await,
        ChatCompletion { .. } => adapter.chat_completion(ctx, key, request).await,
        Responses { .. } => adapter.responses(ctx, key, request).await,
        Embedding { .. } => adapter.embedding(ctx, key, request).await,
        Speech { .. } => adapter.speech(ctx, key, request).await,
        Transcription { .. } => adapter.transcription(ctx, key, request).await,
    }
}
