use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::{ChatMessage, RequestKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// Metadata the engine stamps onto every response before handing it back to
/// the caller. Populated unconditionally on the success path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraFields {
    pub provider: String,
    pub model_requested: String,
    pub request_type: RequestKind,
    pub latency: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    TextCompletion { text: String },
    ChatCompletion { choices: Vec<ChatMessage> },
    Responses { output: Value },
    Embedding { data: Vec<Vec<f32>> },
    Speech { audio: Vec<u8>, mime_type: String },
    Transcription { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BifrostResponse {
    pub id: Option<String>,
    pub body: ResponseBody,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    pub extra: ExtraFields,
}

/// A chunk of a streamed response; the final chunk in a stream carries
/// `done = true` and no further chunks follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: ResponseBody,
    pub done: bool,
}
