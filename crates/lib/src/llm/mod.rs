//! Responder abstraction and the hosted inference client.
//!
//! A [`Responder`] turns one utterance into a [`ResponderOutcome`]. Failures are values, never errors,
//! so the gateway always has something to say back to the user.

mod inference;

use async_trait::async_trait;

pub use inference::InferenceClient;

/// Why a responder call produced no reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Unreachable,
    BadStatus(u16),
    UnparsableResponse,
}

impl FailureKind {
    /// Transient failures worth another attempt. Client errors (4xx) and bad bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureKind::Timeout | FailureKind::Unreachable => true,
            FailureKind::BadStatus(code) => *code >= 500,
            FailureKind::UnparsableResponse => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderOutcome {
    Success { text: String },
    /// `detail` is for logs only.
    Failure { kind: FailureKind, detail: String },
}

impl ResponderOutcome {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        ResponderOutcome::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponderOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<&FailureKind> {
        match self {
            ResponderOutcome::Failure { kind, .. } => Some(kind),
            ResponderOutcome::Success { .. } => None,
        }
    }
}

/// Produces a reply for one utterance. Must not block other turns and must not mutate shared state.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, utterance: &str) -> ResponderOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::Unreachable.is_retryable());
        assert!(FailureKind::BadStatus(503).is_retryable());
        assert!(!FailureKind::BadStatus(429).is_retryable());
        assert!(!FailureKind::BadStatus(400).is_retryable());
        assert!(!FailureKind::UnparsableResponse.is_retryable());
    }
}
