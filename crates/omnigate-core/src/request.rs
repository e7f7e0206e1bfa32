use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single alternate {provider, model} pair to try if the primary attempt fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fallback {
    pub provider: String,
    pub model: String,
}

/// Free-form per-request parameters (temperature, max_tokens, tool choice, ...).
///
/// The dispatch engine never inspects these; they pass through to the
/// provider adapter untouched. Kept as a JSON object so adapters for very
/// different provider families can each interpret the fields they need.
pub type Params = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestInput {
    TextCompletion { prompt: String },
    ChatCompletion { messages: Vec<ChatMessage> },
    Responses { input: Value },
    Embedding { input: Vec<String> },
    Speech { text: String, voice: Option<String> },
    Transcription { audio: Vec<u8>, mime_type: String },
}

impl RequestInput {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestInput::TextCompletion { .. } => RequestKind::TextCompletion,
            RequestInput::ChatCompletion { .. } => RequestKind::ChatCompletion,
            RequestInput::Responses { .. } => RequestKind::Responses,
            RequestInput::Embedding { .. } => RequestKind::Embedding,
            RequestInput::Speech { .. } => RequestKind::Speech,
            RequestInput::Transcription { .. } => RequestKind::Transcription,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    TextCompletion,
    ChatCompletion,
    Responses,
    Embedding,
    Speech,
    Transcription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object, matching how provider wire formats carry it.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BifrostRequest {
    pub provider: String,
    pub model: String,
    pub input: RequestInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<Fallback>,
}

impl BifrostRequest {
    /// A copy of this request aimed at a fallback {provider, model}, with the
    /// original input, params and fallback list carried over unchanged.
    pub fn for_fallback(&self, fallback: &Fallback) -> Self {
        Self {
            provider: fallback.provider.clone(),
            model: fallback.model.clone(),
            input: self.input.clone(),
            params: self.params.clone(),
            fallbacks: self.fallbacks.clone(),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.input.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_fallback_swaps_provider_and_model_only() {
        let req = BifrostRequest {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            input: RequestInput::ChatCompletion { messages: vec![] },
            params: None,
            fallbacks: vec![Fallback {
                provider: "anthropic".into(),
                model: "claude-3-5-sonnet".into(),
            }],
        };
        let fb = req.for_fallback(&req.fallbacks[0]);
        assert_eq!(fb.provider, "anthropic");
        assert_eq!(fb.model, "claude-3-5-sonnet");
        assert_eq!(fb.kind(), RequestKind::ChatCompletion);
    }
}
