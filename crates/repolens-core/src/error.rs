//! Failure taxonomy for calls into rate-limited upstream providers.

use thiserror::Error;

use crate::keyring::FailureKind;

/// Why an embedding or generation call did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// No pool key is usable and no fallback key is configured.
    /// The upstream call was not attempted.
    #[error("all API keys are cooling down or throttled and no fallback key is configured")]
    QuotaExhausted,

    /// The provider rejected this call for exceeding a rate limit or quota.
    #[error("rate limited by upstream (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    /// Non-retryable client error (bad key, bad request, unknown model).
    #[error("upstream rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Network failure, timeout, server error, or an unparseable response.
    #[error("upstream request failed: {0}")]
    Transient(String),
}

impl UpstreamError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => UpstreamError::RateLimited { status, message },
            408 | 500..=599 => UpstreamError::Transient(format!("HTTP {}: {}", status, message)),
            _ => UpstreamError::Rejected { status, message },
        }
    }

    /// The classification handed to the key rotation manager.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            UpstreamError::RateLimited { .. } => FailureKind::RateLimited,
            _ => FailureKind::Other,
        }
    }

    /// Whether repeating the call (possibly with another key) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited { .. } | UpstreamError::Transient(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            UpstreamError::from_status(429, "slow down"),
            UpstreamError::RateLimited { status: 429, .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(503, "unavailable"),
            UpstreamError::Transient(_)
        ));
        assert!(matches!(
            UpstreamError::from_status(401, "bad key"),
            UpstreamError::Rejected { status: 401, .. }
        ));
    }

    #[test]
    fn only_rate_limits_cool_keys_down() {
        let limited = UpstreamError::from_status(429, "");
        assert_eq!(limited.failure_kind(), FailureKind::RateLimited);
        assert_eq!(
            UpstreamError::Transient("reset".into()).failure_kind(),
            FailureKind::Other
        );
        assert!(!UpstreamError::QuotaExhausted.is_retryable());
        assert!(limited.is_retryable());
    }
}
