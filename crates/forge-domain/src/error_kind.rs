//! Error classification for failures of the external transformation call
//!
//! Failures are classified exactly once, at the boundary where the provider
//! response is received. Everything downstream (retry decisions, error logs,
//! final reports) only ever sees the closed [`ErrorKind`] set.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of failure kinds for one external call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call did not complete within its timeout
    Timeout,

    /// The provider rejected the call because of rate limits (HTTP 429)
    RateLimited,

    /// The provider failed internally (HTTP 5xx)
    ServerError,

    /// Transient connection failure (refused, reset, DNS)
    Connection,

    /// The request built from the payload is invalid (HTTP 400, bad record)
    MalformedRequest,

    /// Credentials were rejected (HTTP 401/403)
    Authentication,

    /// The response could not be parsed into a transformed payload
    InvalidResponse,
}

impl ErrorKind {
    /// Whether a failure of this kind is expected to be transient
    ///
    /// # Examples
    ///
    /// ```
    /// use forge_domain::ErrorKind;
    ///
    /// assert!(ErrorKind::RateLimited.is_retryable());
    /// assert!(!ErrorKind::Authentication.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::ServerError
                | ErrorKind::Connection
        )
    }

    /// Whether a failure of this kind must not be retried
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    /// Stable name used in error logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Connection => "connection",
            ErrorKind::MalformedRequest => "malformed_request",
            ErrorKind::Authentication => "authentication",
            ErrorKind::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure returned by a [`crate::Transformer`]
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct TransformError {
    /// Classification of the failure
    pub kind: ErrorKind,

    /// Human-readable detail for the error log
    pub message: String,
}

impl TransformError {
    /// Create a classified error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the failure is worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
