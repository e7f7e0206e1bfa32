use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use omnigate_core::{
    BifrostError, BifrostRequest, BifrostResponse, DispatchContext, ExtraFields, Key,
    ProviderAdapter, StreamChunk, StreamReceiver,
};
use tokio::sync::mpsc;

/// One scripted outcome for a single `MockAdapter` call.
pub enum Scripted {
    Response(BifrostResponse),
    Error(BifrostError),
    /// Chunks to emit from `stream`, in order; the last one should carry
    /// `done = true`.
    Stream(Vec<Result<StreamChunk, BifrostError>>),
}

/// A `ProviderAdapter` driven entirely by a pre-loaded script, for exercising
/// the dispatcher's retry, fallback and plugin-pipeline logic without any
/// real provider. Every call to a non-streaming method pops the next
/// scripted outcome off the front of the queue; an exhausted script is an
/// engine-internal error (never mistaken for a retryable provider failure).
pub struct MockAdapter {
    provider_key: String,
    script: Mutex<VecDeque<Scripted>>,
}

impl MockAdapter {
    pub fn new(provider_key: impl Into<String>, script: Vec<Scripted>) -> Self {
        Self {
            provider_key: provider_key.into(),
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    fn next(&self) -> Scripted {
        self.script
            .lock()
            .expect("mock adapter mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Scripted::Error(BifrostError::internal("mock adapter script exhausted"))
            })
    }

    fn next_response(&self, request: &BifrostRequest) -> Result<BifrostResponse, BifrostError> {
        match self.next() {
            Scripted::Response(mut response) => {
                response.extra.provider = self.provider_key.clone();
                response.extra.model_requested = request.model.clone();
                response.extra.request_type = request.kind();
                Ok(response)
            }
            Scripted::Error(err) => Err(err),
            Scripted::Stream(_) => Err(BifrostError::internal(
                "mock adapter script entry is a stream, not a response",
            )),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider_key(&self) -> &str {
        &self.provider_key
    }

    async fn text_completion(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.next_response(request)
    }

    async fn chat_completion(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.next_response(request)
    }

    async fn responses(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.next_response(request)
    }

    async fn embedding(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.next_response(request)
    }

    async fn speech(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.next_response(request)
    }

    async fn transcription(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        request: &BifrostRequest,
    ) -> Result<BifrostResponse, BifrostError> {
        self.next_response(request)
    }

    async fn stream(
        &self,
        _ctx: &DispatchContext,
        _key: Option<&Key>,
        request: &BifrostRequest,
    ) -> Result<StreamReceiver, BifrostError> {
        let chunks = match self.next() {
            Scripted::Stream(chunks) => chunks,
            Scripted::Error(err) => return Err(err),
            Scripted::Response(_) => {
                return Err(BifrostError::internal(
                    "mock adapter script entry is a response, not a stream",
                ));
            }
        };

        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn list_models(
        &self,
        _ctx: &DispatchContext,
        _keys: &[Key],
    ) -> Result<BifrostResponse, BifrostError> {
        self.next_response(&BifrostRequest {
            provider: self.provider_key.clone(),
            model: String::new(),
            input: omnigate_core::RequestInput::TextCompletion {
                prompt: String::new(),
            },
            params: None,
            fallbacks: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnigate_core::{RequestInput, ResponseBody};

    fn ok_response() -> BifrostResponse {
        BifrostResponse {
            id: Some("r1".into()),
            body: ResponseBody::ChatCompletion { choices: vec![] },
            usage: None,
            raw: None,
            extra: ExtraFields {
                provider: String::new(),
                model_requested: String::new(),
                request_type: omnigate_core::RequestKind::ChatCompletion,
                latency: std::time::Duration::ZERO,
            },
        }
    }

    fn chat_request() -> BifrostRequest {
        BifrostRequest {
            provider: "mock".into(),
            model: "mock-model".into(),
            input: RequestInput::ChatCompletion { messages: vec![] },
            params: None,
            fallbacks: vec![],
        }
    }

    #[tokio::test]
    async fn script_is_consumed_in_order() {
        let adapter = MockAdapter::new(
            "mock",
            vec![
                Scripted::Error(BifrostError::provider(Some(500), "first fails")),
                Scripted::Response(ok_response()),
            ],
        );
        let ctx = DispatchContext::new("t1");
        let req = chat_request();

        let first = adapter.chat_completion(&ctx, None, &req).await;
        assert!(first.is_err());
        let second = adapter.chat_completion(&ctx, None, &req).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn exhausted_script_is_an_internal_error() {
        let adapter = MockAdapter::new("mock", vec![]);
        let err = adapter
            .chat_completion(&DispatchContext::new("t1"), None, &chat_request())
            .await
            .unwrap_err();
        assert!(err.is_bifrost_error);
    }

    #[tokio::test]
    async fn stream_emits_scripted_chunks_in_order() {
        let adapter = MockAdapter::new(
            "mock",
            vec![Scripted::Stream(vec![
                Ok(StreamChunk {
                    delta: ResponseBody::ChatCompletion { choices: vec![] },
                    done: false,
                }),
                Ok(StreamChunk {
                    delta: ResponseBody::ChatCompletion { choices: vec![] },
                    done: true,
                }),
            ])],
        );
        let mut rx = adapter
            .stream(&DispatchContext::new("t1"), None, &chat_request())
            .await
            .unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        assert!(!first.done);
        let second = rx.recv().await.unwrap().unwrap();
        assert!(second.done);
        assert!(rx.recv().await.is_none());
    }
}
