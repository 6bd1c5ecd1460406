//! The single-attempt model endpoint abstraction.
//!
//! A [`ModelEndpoint`] performs exactly one blocking request and classifies
//! any failure into a [`FailureKind`]. Retrying, backoff and cancellation are
//! the [`LlmClient`](super::LlmClient)'s job, so endpoints stay small and a
//! scripted in-memory endpoint can stand in for a real provider in tests.

use crate::prompt::PromptPayload;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Per-attempt settings handed to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOptions {
    /// Timeout for this request only; independent of the retry budget.
    pub timeout: Duration,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimited,
    Server,
    Network,
    Authentication,
    MalformedRequest,
    /// The provider refused to produce content (safety filters).
    ContentRejected,
    /// The provider answered, but not with usable text.
    InvalidResponse,
}

impl FailureKind {
    /// Whether another attempt may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Server | Self::Network
        )
    }

    /// Map an unsuccessful HTTP status to a failure class.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            _ => Self::MalformedRequest,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Server => "server",
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::MalformedRequest => "malformed_request",
            Self::ContentRejected => "content_rejected",
            Self::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed attempt: its class and the provider's message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EndpointError {
    pub kind: FailureKind,
    pub message: String,
}

impl EndpointError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from an HTTP status and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, truncate(body, 300))
        };
        Self::new(FailureKind::from_status(status), message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(feature = "ai")]
impl From<reqwest::Error> for EndpointError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if let Some(status) = err.status() {
            FailureKind::from_status(status.as_u16())
        } else if err.is_decode() {
            FailureKind::InvalidResponse
        } else if err.is_builder() {
            FailureKind::MalformedRequest
        } else {
            FailureKind::Network
        };
        Self::new(kind, err.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// One blocking request to a language model.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the pipeline may hold the endpoint
/// while other stages run on worker threads.
pub trait ModelEndpoint: Send + Sync {
    /// Send the payload once and return the generated text.
    fn send(&self, payload: &PromptPayload, options: &AttemptOptions) -> Result<String, EndpointError>;

    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Model used by this endpoint, when known.
    fn model(&self) -> Option<&str> {
        None
    }
}

impl<E: ModelEndpoint + ?Sized> ModelEndpoint for &E {
    fn send(&self, payload: &PromptPayload, options: &AttemptOptions) -> Result<String, EndpointError> {
        (**self).send(payload, options)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> Option<&str> {
        (**self).model()
    }
}

impl<E: ModelEndpoint + ?Sized> ModelEndpoint for Box<E> {
    fn send(&self, payload: &PromptPayload, options: &AttemptOptions) -> Result<String, EndpointError> {
        (**self).send(payload, options)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> Option<&str> {
        (**self).model()
    }
}

impl<E: ModelEndpoint + ?Sized> ModelEndpoint for Arc<E> {
    fn send(&self, payload: &PromptPayload, options: &AttemptOptions) -> Result<String, EndpointError> {
        (**self).send(payload, options)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> Option<&str> {
        (**self).model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(FailureKind::from_status(401), FailureKind::Authentication);
        assert_eq!(FailureKind::from_status(403), FailureKind::Authentication);
        assert_eq!(FailureKind::from_status(408), FailureKind::Timeout);
        assert_eq!(FailureKind::from_status(429), FailureKind::RateLimited);
        assert_eq!(FailureKind::from_status(500), FailureKind::Server);
        assert_eq!(FailureKind::from_status(503), FailureKind::Server);
        assert_eq!(FailureKind::from_status(400), FailureKind::MalformedRequest);
        assert_eq!(FailureKind::from_status(404), FailureKind::MalformedRequest);
    }

    #[test]
    fn test_retryable_split() {
        for kind in [
            FailureKind::Timeout,
            FailureKind::RateLimited,
            FailureKind::Server,
            FailureKind::Network,
        ] {
            assert!(kind.is_retryable(), "{kind} should be retryable");
        }
        for kind in [
            FailureKind::Authentication,
            FailureKind::MalformedRequest,
            FailureKind::ContentRejected,
            FailureKind::InvalidResponse,
        ] {
            assert!(!kind.is_retryable(), "{kind} should be fatal");
        }
    }

    #[test]
    fn test_error_from_status_truncates_body() {
        let body = "x".repeat(1_000);
        let err = EndpointError::from_status(503, &body);
        assert_eq!(err.kind, FailureKind::Server);
        assert!(err.message.starts_with("HTTP 503: "));
        assert!(err.message.len() < 400);
        assert!(err.to_string().starts_with("server: "));
    }

    #[test]
    fn test_error_serializes_kind_snake_case() {
        let err = EndpointError::new(FailureKind::RateLimited, "slow down");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"rate_limited\""));
    }
}
