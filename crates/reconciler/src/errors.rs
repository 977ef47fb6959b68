//! Error and retry-policy types for the reconciliation domain.
//!
//! The taxonomy follows how each condition is handled:
//!
//! | Condition | Type | Handling |
//! |-----------|------|----------|
//! | Referenced record missing | `Ok(None)` / [`GatewayError::NotFound`] | self-heal, not an error |
//! | Network / 5xx from a gateway | [`GatewayError::Transient`] | mapping skipped, retried next pass |
//! | Malformed ingestion input | [`ValidationError`] | rejected synchronously |
//! | Missing required settings | [`ConfigurationError`] | fatal at startup |
//!
//! [`SyncError`] wraps whatever stopped one mapping's sync. It is logged by the
//! engine and never escapes a phase.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a gateway failure is worth retrying on a later pass.
///
/// The engine never retries within a pass; the policy is recorded in the log
/// line so operators can tell a flaky remote from a rejected request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may succeed on a later attempt.
    Retryable {
        /// Minimum back-off before the next attempt, when the remote said so.
        after: Option<Duration>,
    },
    /// The remote rejected the request; retrying unchanged will fail again.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Failure reported by any of the outbound gateways.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// The referenced remote record does not exist.
    #[error("{system}: {resource} not found")]
    NotFound {
        /// Remote system name (`"case-system"`, `"tracker"`, `"notifier"`).
        system: &'static str,
        /// Description of the missing resource.
        resource: String,
    },

    /// Network failure, timeout, or 5xx response.
    #[error("{system}: transient failure: {message}")]
    Transient {
        /// Remote system name.
        system: &'static str,
        /// Human-readable failure description.
        message: String,
    },

    /// The remote rejected the request (4xx other than 404).
    #[error("{system}: request rejected with status {status}: {message}")]
    Rejected {
        /// Remote system name.
        system: &'static str,
        /// HTTP status code returned by the remote.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The remote answered with a payload that could not be interpreted.
    #[error("{system}: could not decode response: {message}")]
    Decode {
        /// Remote system name.
        system: &'static str,
        /// Decoder error description.
        message: String,
    },
}

impl GatewayError {
    /// Returns the retry policy for this failure.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            GatewayError::Transient { .. } => RetryPolicy::Retryable { after: None },
            GatewayError::NotFound { .. }
            | GatewayError::Rejected { .. }
            | GatewayError::Decode { .. } => RetryPolicy::NonRetryable,
        }
    }

    /// Returns `true` for [`GatewayError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Failure reported by the mapping store or the run lock.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("mapping store conflict: {message}")]
    Conflict {
        /// Which constraint was violated.
        message: String,
    },

    /// The storage backend failed.
    #[error("mapping store failure: {message}")]
    Backend {
        /// Backend error description.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Ingestion and configuration
// ---------------------------------------------------------------------------

/// Malformed ingestion input. The only caller-visible failure surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The tenant id is not a four-digit municipality id.
    #[error("invalid tenant id '{value}': expected four digits")]
    InvalidTenantId {
        /// The rejected value as supplied.
        value: String,
    },

    /// The case key is blank or too long.
    #[error("invalid case key: {reason}")]
    InvalidCaseKey {
        /// Why the key was rejected.
        reason: String,
    },
}

/// A required setting is missing or invalid. Produced at startup only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("configuration error: {message}")]
pub struct ConfigurationError {
    /// Description of the configuration problem.
    pub message: String,
}

impl ConfigurationError {
    /// Creates a [`ConfigurationError`] from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-mapping sync failure
// ---------------------------------------------------------------------------

/// What stopped a single mapping's synchronization step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// A gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Reading or writing the mapping failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Returns the retry policy recorded alongside the failure.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            SyncError::Gateway(err) => err.retry_policy(),
            SyncError::Store(_) => RetryPolicy::Retryable { after: None },
        }
    }
}

/// Failure returned from [`crate::ingest::Ingestor::ingest`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    /// The input was rejected before touching the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store failed to persist the mapping.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_gateway_errors_are_retryable() {
        let transient = GatewayError::Transient {
            system: "tracker",
            message: "connection reset".into(),
        };
        let rejected = GatewayError::Rejected {
            system: "tracker",
            status: 400,
            message: "bad field".into(),
        };
        assert_eq!(
            transient.retry_policy(),
            RetryPolicy::Retryable { after: None }
        );
        assert_eq!(rejected.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(
            SyncError::from(transient).retry_policy(),
            RetryPolicy::Retryable { after: None }
        );
    }
}
