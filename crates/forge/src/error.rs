//! Forge error taxonomy.
//!
//! Errors split into transient (network failures, rate limits, server-side
//! errors — safe to retry with backoff) and permanent (auth, not-found,
//! malformed payloads — retrying cannot help). The orchestrator consults
//! [`ForgeError::is_transient`] at its call sites.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("forge API error: {status} - {message}")]
    Api {
        /// HTTP status code returned by the forge.
        status: u16,
        /// Message from the forge's error body, when one was provided.
        message: String,
    },

    #[error("rate limit exceeded, reset in {reset_in:?}")]
    RateLimited {
        /// How long until the limit window resets.
        reset_in: Duration,
    },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ForgeError {
    /// Whether the operation may succeed if retried after a delay.
    ///
    /// Network-level failures and timeouts are treated as transient; so are
    /// rate limits and server-side (5xx) responses. Everything else is
    /// permanent and must abort the current item or event.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::AuthenticationFailed | Self::NotFound { .. } | Self::Serialization(_) => false,
        }
    }

    /// Server-provided minimum delay before the next attempt, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { reset_in } => Some(*reset_in),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient_with_delay() {
        let error = ForgeError::RateLimited {
            reset_in: Duration::from_secs(30),
        };
        assert!(error.is_transient());
        assert_eq!(error.retry_after(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_server_errors_are_transient() {
        let error = ForgeError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert!(error.is_transient());
        assert!(error.retry_after().is_none());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let error = ForgeError::Api {
            status: 422,
            message: "validation failed".to_string(),
        };
        assert!(!error.is_transient());

        assert!(!ForgeError::AuthenticationFailed.is_transient());
        assert!(!ForgeError::NotFound {
            resource: "issue #9".to_string()
        }
        .is_transient());
    }
}
