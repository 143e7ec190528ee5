//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use halink_config::ConfigError;
use halink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Home Assistant: {reason}")]
    #[diagnostic(
        code(halink::connection_failed),
        help(
            "Check that the instance is running and reachable.\n\
             Try: halink ping --insecure"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Connection to Home Assistant was lost")]
    #[diagnostic(
        code(halink::disconnected),
        help("Retry the command, or run `halink watch` to keep a session alive.")
    )]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(halink::auth_failed),
        help(
            "The access token was rejected.\n\
             Create a new long-lived token in your Home Assistant profile, then run: halink login"
        )
    )]
    AuthFailed { message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(halink::no_credentials),
        help(
            "Configure one with: halink login\n\
             Or set the HALINK_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(halink::not_found),
        help("Run: halink {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Home Assistant rejected the command ({code}): {message}")]
    #[diagnostic(code(halink::command_failed))]
    CommandFailed { code: String, message: String },

    #[error("API error: {message}")]
    #[diagnostic(code(halink::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(halink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(halink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: halink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No instance configured")]
    #[diagnostic(
        code(halink::no_config),
        help(
            "Create a profile with: halink config init (or halink login)\n\
             Or pass --url and --token.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(halink::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    #[diagnostic(
        code(halink::timeout),
        help("Increase the timeout in your profile or check instance responsiveness.")
    )]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(halink::json), help("Check the JSON input and try again."))]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    #[diagnostic(code(halink::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => Self::ConnectionFailed { reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Disconnected => Self::Disconnected,
            CoreError::Timeout {
                operation,
                timeout_ms,
            } => Self::Timeout {
                operation: operation.into(),
                timeout_ms,
            },
            CoreError::MissingCredentials { .. } => Self::NoCredentials {
                profile: "current".into(),
            },
            CoreError::CommandFailed { code, message } => Self::CommandFailed { code, message },
            CoreError::Validation { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Api { message, status } => Self::ApiError {
                message: match status {
                    Some(status) => format!("HTTP {status}: {message}"),
                    None => message,
                },
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => Self::ApiError { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            other => Self::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_exits_with_auth_code() {
        let err = CliError::from(CoreError::AuthenticationFailed {
            message: "invalid access token".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn bad_input_exits_with_usage_code() {
        let err = CliError::from(CoreError::Validation {
            message: "not a number".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn lost_session_exits_with_connection_code() {
        assert_eq!(
            CliError::from(CoreError::Disconnected).exit_code(),
            exit_code::CONNECTION
        );
    }

    #[test]
    fn missing_profile_token_keeps_profile_name() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "cabin".into(),
        });
        assert!(matches!(err, CliError::NoCredentials { ref profile } if profile == "cabin"));
    }
}
