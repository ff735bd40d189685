// ── Core error types ──
//
// Domain errors from tailctl-core. Every variant belongs to exactly one of
// the stable `ErrorKind`s; the `From<tailctl_api::Error>` impl folds
// transport-layer detail into them and keeps the retry bookkeeping.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

pub use tailctl_api::ErrorKind;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// How many attempts a remote call took before giving up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryInfo {
    pub attempts: u32,
    #[serde(with = "duration_millis")]
    pub waited: Duration,
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Caller errors ────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        fields: Vec<FieldIssue>,
    },

    #[error("{entity} not found: {identifier}")]
    NotFound { entity: String, identifier: String },

    // ── Credential errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Not authorized: {message}")]
    Authorization { message: String },

    // ── Remote-side errors ───────────────────────────────────────────
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { message: String, retry: RetryInfo },

    #[error("Transient server error: {message}")]
    TransientServer {
        status: Option<u16>,
        message: String,
        retry: RetryInfo,
    },

    #[error("Policy was only partially applied: {message}")]
    PolicyPartiallyApplied { message: String },

    #[error("Network error: {message}")]
    Network { message: String, retry: RetryInfo },
}

impl CoreError {
    // ── Constructors ─────────────────────────────────────────────────

    /// Single-field validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let issue = FieldIssue::new(field, message);
        Self::Validation {
            message: format!("{}: {}", issue.field, issue.message),
            fields: vec![issue],
        }
    }

    /// Validation failure covering several fields at once.
    pub fn invalid_fields(summary: impl Into<String>, fields: Vec<FieldIssue>) -> Self {
        let mut message = summary.into();
        for issue in &fields {
            let _ = write!(message, "; {}: {}", issue.field, issue.message);
        }
        Self::Validation { message, fields }
    }

    pub fn not_found(entity: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            identifier: identifier.into(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::TransientServer { .. } | Self::PolicyPartiallyApplied { .. } => {
                ErrorKind::TransientServer
            }
            Self::Network { .. } => ErrorKind::Network,
        }
    }

    /// Machine-stable code. Equal to the kind's code except where a more
    /// specific one exists.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PolicyPartiallyApplied { .. } => "POLICY_PARTIALLY_APPLIED",
            other => other.kind().code(),
        }
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            Self::PolicyPartiallyApplied { .. } => {
                "Some nodes have not received the policy yet. Re-read the policy to confirm, or roll back."
            }
            other => other.kind().remediation(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Authentication { .. } => Some(401),
            Self::Authorization { .. } => Some(403),
            Self::PolicyPartiallyApplied { .. } => Some(207),
            Self::TransientServer { status, .. } => *status,
            _ => None,
        }
    }

    /// Offending input fields, for validation errors.
    pub fn fields(&self) -> &[FieldIssue] {
        match self {
            Self::Validation { fields, .. } => fields,
            _ => &[],
        }
    }

    pub fn retry_info(&self) -> Option<RetryInfo> {
        match self {
            Self::RateLimitExceeded { retry, .. }
            | Self::TransientServer { retry, .. }
            | Self::Network { retry, .. } => Some(*retry),
            _ => None,
        }
    }

    fn with_retry(mut self, info: RetryInfo) -> Self {
        if let Self::RateLimitExceeded { retry, .. }
        | Self::TransientServer { retry, .. }
        | Self::Network { retry, .. } = &mut self
        {
            *retry = info;
        }
        self
    }

    /// Structured error payload for tool hosts.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "kind": self.kind(),
            "code": self.code(),
            "message": self.to_string(),
            "remediation": self.remediation(),
        });
        if let Some(status) = self.status() {
            body["status"] = json!(status);
        }
        if !self.fields().is_empty() {
            body["fields"] = json!(self.fields());
        }
        if let Some(retry) = self.retry_info() {
            if retry.attempts > 0 {
                body["retry"] = json!(retry);
            }
        }
        body
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tailctl_api::Error> for CoreError {
    fn from(err: tailctl_api::Error) -> Self {
        use tailctl_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::Authentication { message },
            Api::Authorization { message } => CoreError::Authorization { message },
            Api::NotFound { path } => CoreError::NotFound {
                entity: "resource".into(),
                identifier: path,
            },
            Api::Validation {
                message, fields, ..
            } => CoreError::Validation {
                message,
                fields: fields
                    .into_iter()
                    .map(|f| FieldIssue::new(f.field, f.message))
                    .collect(),
            },
            Api::Conflict { message, .. } => CoreError::Validation {
                fields: vec![FieldIssue::new(
                    "revision",
                    "stored policy changed since it was read",
                )],
                message: format!("revision conflict: {message}"),
            },
            Api::Serialization(e) => CoreError::validation("body", e.to_string()),
            Api::InvalidUrl(e) => CoreError::validation("base_url", e.to_string()),
            Api::UnexpectedStatus { status, message } => CoreError::Validation {
                message: format!("unexpected HTTP {status}: {message}"),
                fields: Vec::new(),
            },
            e @ (Api::RateLimited { .. } | Api::RateLimitWait { .. }) => {
                CoreError::RateLimitExceeded {
                    message: e.to_string(),
                    retry: RetryInfo::default(),
                }
            }
            Api::Server { status, message } => CoreError::TransientServer {
                status: Some(status),
                message,
                retry: RetryInfo::default(),
            },
            Api::PartialApply { message } => CoreError::PolicyPartiallyApplied { message },
            Api::Deserialization { message, body: _ } => CoreError::TransientServer {
                status: None,
                message: format!("unreadable response: {message}"),
                retry: RetryInfo::default(),
            },
            e @ (Api::Transport(_) | Api::Timeout { .. } | Api::Cancelled | Api::Tls(_)) => {
                CoreError::Network {
                    message: e.to_string(),
                    retry: RetryInfo::default(),
                }
            }
            Api::RetriesExhausted {
                attempts,
                waited,
                source,
            } => CoreError::from(*source).with_retry(RetryInfo { attempts, waited }),
        }
    }
}
