use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the `tailctl-api` crate.
///
/// One variant per failure mode of the control-plane REST surface.
/// `tailctl-core` folds these into the seven stable [`ErrorKind`]s that
/// callers branch on.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// API key missing, expired or rejected (HTTP 401).
    #[error("Authentication failed (HTTP 401): {message}")]
    Authentication { message: String },

    /// Key is valid but lacks the scope for this call (HTTP 403).
    #[error("Not authorized (HTTP 403): {message}")]
    Authorization { message: String },

    // ── Request ─────────────────────────────────────────────────────
    /// Resource does not exist (HTTP 404).
    #[error("Resource not found: {path}")]
    NotFound { path: String },

    /// Request rejected as malformed (HTTP 400 / 422).
    #[error("Request rejected (HTTP {status}): {message}")]
    Validation {
        status: u16,
        message: String,
        fields: Vec<FieldError>,
    },

    /// Stale revision on a conditional write (HTTP 409 / 412).
    #[error("Revision conflict (HTTP {status}): {message}")]
    Conflict { status: u16, message: String },

    /// Request body could not be encoded.
    #[error("Failed to encode request body: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Throttling ──────────────────────────────────────────────────
    /// Rate limited by the server (HTTP 429).
    #[error("Rate limited by server{}", fmt_retry_after(*retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The local limiter would have to wait longer than its ceiling.
    #[error("Local rate limit for '{endpoint}' needs {wait:?}, above the {max_wait:?} ceiling")]
    RateLimitWait {
        endpoint: String,
        wait: Duration,
        max_wait: Duration,
    },

    // ── Server ──────────────────────────────────────────────────────
    /// Server-side failure (HTTP 5xx).
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// ACL write accepted but only partially deployed.
    #[error("Policy accepted but only partially applied: {message}")]
    PartialApply { message: String },

    /// Status the client has no mapping for.
    #[error("Unexpected HTTP status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Caller cancelled the in-flight call.
    #[error("Request cancelled")]
    Cancelled,

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Retry ───────────────────────────────────────────────────────
    /// Every permitted attempt failed with a transient error.
    #[error("Gave up after {attempts} attempt(s) and {waited:?} of backoff: {source}")]
    RetriesExhausted {
        attempts: u32,
        waited: Duration,
        #[source]
        source: Box<Error>,
    },
}

fn fmt_retry_after(retry_after: Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |d| format!(" -- retry after {}s", d.as_secs()))
}

/// Field-level detail parsed from a validation error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Stable error categories exposed to every caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    RateLimitExceeded,
    TransientServer,
    Network,
}

impl ErrorKind {
    /// Machine-stable code for this category.
    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Authorization => "AUTHORIZATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::TransientServer => "TRANSIENT_SERVER_ERROR",
            Self::Network => "NETWORK_ERROR",
        }
    }

    /// Short remediation hint suitable for end users.
    pub fn remediation(self) -> &'static str {
        match self {
            Self::Validation => "Check the request parameters and try again.",
            Self::Authentication => "Check that the API key is set and has not expired.",
            Self::Authorization => "The API key lacks the scope for this operation; use a key with broader access.",
            Self::NotFound => "Check the identifier; list the resources to see what exists.",
            Self::RateLimitExceeded => "Wait before retrying or lower the request rate.",
            Self::TransientServer => "The control plane had a temporary problem; retry shortly.",
            Self::Network => "Check network connectivity to the control plane.",
        }
    }

    /// Whether callers may reasonably retry later.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::TransientServer | Self::Network
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Error {
    /// Stable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. }
            | Self::Conflict { .. }
            | Self::Serialization(_)
            | Self::InvalidUrl(_)
            | Self::UnexpectedStatus { .. } => ErrorKind::Validation,
            Self::RateLimited { .. } | Self::RateLimitWait { .. } => ErrorKind::RateLimitExceeded,
            Self::Server { .. } | Self::PartialApply { .. } | Self::Deserialization { .. } => {
                ErrorKind::TransientServer
            }
            Self::Transport(_) | Self::Timeout { .. } | Self::Cancelled | Self::Tls(_) => {
                ErrorKind::Network
            }
            Self::RetriesExhausted { source, .. } => source.kind(),
        }
    }

    /// HTTP status behind this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::Authorization { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::PartialApply { .. } => Some(207),
            Self::Validation { status, .. }
            | Self::Conflict { status, .. }
            | Self::Server { status, .. }
            | Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::RetriesExhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Server-provided minimum wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
