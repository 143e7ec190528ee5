// ── Core error types ──
//
// User-facing errors from halink-core. Consumers never see raw websocket
// frames or HTTP bodies; the `From<halink_api::Error>` impl translates
// transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to Home Assistant: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Not connected to Home Assistant")]
    Disconnected,

    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("No stored credentials: {message}")]
    MissingCredentials { message: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Home Assistant rejected the command ({code}): {message}")]
    CommandFailed { code: String, message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the server rejected the access token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<halink_api::Error> for CoreError {
    fn from(err: halink_api::Error) -> Self {
        use halink_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } => Self::AuthenticationFailed { message },
            ApiError::WebSocketConnect(reason) => Self::ConnectionFailed { reason },
            ApiError::WebSocketClosed { code, reason } => Self::ConnectionFailed {
                reason: format!("websocket closed (code {code}): {reason}"),
            },
            ApiError::NotConnected | ApiError::SessionClosed => Self::Disconnected,
            ApiError::Timeout {
                operation,
                timeout_ms,
            } => Self::Timeout {
                operation,
                timeout_ms,
            },
            ApiError::Command { code, message } => Self::CommandFailed { code, message },
            ApiError::Protocol(message) => Self::Internal(format!("protocol error: {message}")),
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    Self::Timeout {
                        operation: "HTTP request",
                        timeout_ms: 0,
                    }
                } else if e.is_connect() {
                    Self::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    Self::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::Http { status, message } => Self::Api {
                message,
                status: Some(status),
            },
            ApiError::InvalidUrl(e) => Self::Config {
                message: format!("invalid URL: {e}"),
            },
            ApiError::Tls(message) => Self::ConnectionFailed {
                reason: format!("TLS error: {message}"),
            },
            ApiError::Deserialization { message, body: _ } => {
                Self::Internal(format!("deserialization error: {message}"))
            }
        }
    }
}
