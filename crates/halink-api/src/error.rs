use thiserror::Error;

/// Top-level error type for the `halink-api` crate.
///
/// Covers every failure mode of the websocket session and the scheduler
/// HTTP channel. `halink-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server answered the handshake with `auth_invalid`, or the HTTP
    /// channel rejected the bearer token. Terminal for the current token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Websocket session ───────────────────────────────────────────
    /// The websocket could not be opened (DNS, TCP, TLS, upgrade).
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The websocket closed before the handshake completed.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// A command or probe was issued while the channel was not open.
    #[error("Session is not connected")]
    NotConnected,

    /// The session was torn down while a command was in flight.
    #[error("Session closed before a response arrived")]
    SessionClosed,

    /// The handshake did not complete in time.
    #[error("Timed out after {timeout_ms}ms waiting for {operation}")]
    Timeout { operation: &'static str, timeout_ms: u64 },

    /// The server answered a command with `success: false`.
    #[error("Command failed ({code}): {message}")]
    Command { code: String, message: String },

    /// A frame could not be built or did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // ── HTTP channel ────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the scheduler endpoints.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration error (unreadable CA file, bad PEM, etc.)
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the server rejected the credential.
    ///
    /// Auth failures are terminal: retrying with the same token cannot
    /// succeed, so reconnect loops must stop on them.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::NotConnected
            | Self::SessionClosed
            | Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
