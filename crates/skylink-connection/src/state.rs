//! Observable connection state.

use std::fmt;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket. A reconnect may be scheduled.
    #[default]
    Disconnected,
    /// A socket is opening.
    Connecting,
    /// The socket is open and the heartbeat is running.
    Connected,
    /// The socket is being closed on request.
    Closing,
}

impl ConnectionState {
    /// `true` only for [`ConnectionState::Connected`].
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Snapshot published to status watchers on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Every reconnect attempt failed and none is scheduled. Cleared by
    /// an explicit `connect`, `reconnect` or `disconnect`.
    pub exhausted: bool,
}
