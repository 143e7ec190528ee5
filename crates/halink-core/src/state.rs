// ── Connection state machine ──
//
// Every change to the observable connection state goes through
// `ConnectionState::on`, which rejects transitions that would let a stale
// notification clobber a more authoritative state.

use strum::{Display, IntoStaticStr};

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// The server rejected the token; a new one is needed.
    AuthFailed,
    /// The reconnect loop gave up; must be restarted by the user.
    ReconnectFailed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ConnectStarted,
    Authenticated,
    /// The channel went away (close, failed connect, failed probe).
    ChannelLost,
    ReconnectAttempt(u32),
    AuthRejected,
    RetriesExhausted,
    Cancelled,
}

impl ConnectionState {
    /// The state after `transition`, or `None` if it is not accepted here.
    pub fn on(self, transition: Transition) -> Option<Self> {
        use ConnectionState as S;
        use Transition as T;

        match (self, transition) {
            (
                S::Disconnected | S::Connected | S::AuthFailed | S::ReconnectFailed,
                T::ConnectStarted,
            ) => Some(S::Connecting),
            (_, T::Authenticated) => Some(S::Connected),
            // A close reported while a reconnect loop owns the state is stale.
            (S::Connecting | S::Connected, T::ChannelLost) => Some(S::Disconnected),
            (_, T::ReconnectAttempt(attempt)) => Some(S::Reconnecting { attempt }),
            (_, T::AuthRejected) => Some(S::AuthFailed),
            (S::Reconnecting { .. }, T::RetriesExhausted) => Some(S::ReconnectFailed),
            (_, T::Cancelled) => Some(S::Disconnected),
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    pub fn is_reconnecting(self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }
}
