//! CLI error types with miette diagnostics.
//!
//! Maps dispatcher and config failures into user-facing errors with
//! actionable help text and a stable exit code per error kind.

use miette::Diagnostic;
use thiserror::Error;

use tailctl_config::ConfigError;
use tailctl_core::{CoreError, ErrorKind, ToolError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const RATE_LIMITED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const UNAVAILABLE: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Operations ───────────────────────────────────────────────────

    #[error("{context}: {message}")]
    #[diagnostic(code(tailctl::operation), help("{remediation}"))]
    Operation {
        context: String,
        kind: ErrorKind,
        code: &'static str,
        message: String,
        remediation: &'static str,
    },

    // ── Credentials ──────────────────────────────────────────────────

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(tailctl::no_credentials),
        help(
            "Set TAILSCALE_API_KEY, pass --api-key, or store a key with:\n\
             tailctl config set-key --profile {profile}"
        )
    )]
    NoCredentials { profile: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(tailctl::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(tailctl::profile_not_found),
        help("Available profiles: {available}\nRun: tailctl config path")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("{0}")]
    #[diagnostic(code(tailctl::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(tailctl::json), help("Check the JSON text or file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(tailctl::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Operation { kind, .. } => match kind {
                ErrorKind::Validation => exit_code::USAGE,
                ErrorKind::Authentication => exit_code::AUTH,
                ErrorKind::Authorization => exit_code::PERMISSION,
                ErrorKind::NotFound => exit_code::NOT_FOUND,
                ErrorKind::RateLimitExceeded => exit_code::RATE_LIMITED,
                ErrorKind::Network => exit_code::CONNECTION,
                ErrorKind::TransientServer => exit_code::UNAVAILABLE,
            },
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::Json(_) => {
                exit_code::USAGE
            }
            Self::Config(_) | Self::Io(_) | Self::Render(_) => exit_code::GENERAL,
        }
    }
}

// ── Core / config → CliError mapping ─────────────────────────────────

impl From<ToolError> for CliError {
    fn from(err: ToolError) -> Self {
        Self::Operation {
            context: format!("{}.{}", err.tool, err.operation),
            kind: err.kind(),
            code: err.code(),
            message: err.source.to_string(),
            remediation: err.source.remediation(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        Self::Operation {
            context: "client".into(),
            kind: err.kind(),
            code: err.code(),
            message: err.to_string(),
            remediation: err.remediation(),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::UnknownProfile { name, available } => {
                Self::ProfileNotFound { name, available }
            }
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Client(core) => core.into(),
            ConfigError::Io(io) => Self::Io(io),
            other => Self::Config(other),
        }
    }
}
