use std::fmt;

use thiserror::Error;

/// Semantic error sentinel the dispatcher and callers can match on.
///
/// `RequestCancelled` is the only variant with engine-wide meaning (it
/// short-circuits retry and fallback); everything else is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    RequestCancelled,
    Validation,
    Unsupported,
    Internal,
    Provider,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.message.trim().is_empty() && self.error.is_none()
    }
}

/// The one error type that crosses every boundary in the engine.
///
/// `is_bifrost_error = true` means the failure originated inside the engine
/// itself (bad request, pool exhaustion, plugin contract violation) rather
/// than from a provider round-trip, and is never retried.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{}", self.error.message)]
pub struct BifrostError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<ErrorType>,
    pub is_bifrost_error: bool,
    pub error: ErrorDetail,
}

impl BifrostError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            r#type: Some(ErrorType::Internal),
            is_bifrost_error: true,
            error: ErrorDetail::new(message),
        }
    }

    /// A malformed request, rejected before it ever reaches a provider.
    /// `is_bifrost_error = false`: validation is its own error kind,
    /// distinct from the engine-internal class that flag marks — it is
    /// never retried or fallen back over, but for a different reason
    /// (the caller's input is bad, not the engine's state).
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            r#type: Some(ErrorType::Validation),
            is_bifrost_error: false,
            error: ErrorDetail::new(message),
        }
    }

    pub fn unsupported(what: &str) -> Self {
        Self {
            status_code: None,
            r#type: Some(ErrorType::Unsupported),
            is_bifrost_error: true,
            error: ErrorDetail::new(format!("unsupported operation: {what}")),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status_code: None,
            r#type: Some(ErrorType::RequestCancelled),
            is_bifrost_error: false,
            error: ErrorDetail::new("request cancelled"),
        }
    }

    pub fn provider(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            r#type: Some(ErrorType::Provider),
            is_bifrost_error: false,
            error: ErrorDetail::new(message),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.r#type == Some(ErrorType::RequestCancelled)
    }

    /// True when the error carries no useful information, i.e. a post-hook
    /// can treat it as implicitly recovered if a response is also present.
    pub fn is_empty(&self) -> bool {
        self.status_code.is_none() && self.r#type.is_none() && self.error.is_empty()
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorType::RequestCancelled => "request_cancelled",
            ErrorType::Validation => "validation",
            ErrorType::Unsupported => "unsupported",
            ErrorType::Internal => "internal",
            ErrorType::Provider => "provider",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_never_a_bifrost_error() {
        let err = BifrostError::cancelled();
        assert!(!err.is_bifrost_error);
        assert!(err.is_cancelled());
    }

    #[test]
    fn internal_errors_are_bifrost_errors() {
        let err = BifrostError::internal("boom");
        assert!(err.is_bifrost_error);
        assert!(!err.is_cancelled());
    }

    #[test]
    fn empty_error_detects_as_empty() {
        let err = BifrostError {
            status_code: None,
            r#type: None,
            is_bifrost_error: false,
            error: ErrorDetail::default(),
        };
        assert!(err.is_empty());
    }
}
