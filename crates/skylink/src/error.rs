//! Unified error types for the Skylink client.

use skylink_connection::SendError;
use skylink_protocol::ProtocolError;
use skylink_transport::TransportError;

/// A configuration value that can't be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The URL does not parse.
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The URL parses but is not a WebSocket URL.
    #[error("unsupported scheme {0:?} (expected ws or wss)")]
    UnsupportedScheme(String),

    /// A zero heartbeat interval would ping in a busy loop.
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,

    /// The diagnostics channel needs room for at least one entry.
    #[error("diagnostics capacity must be greater than zero")]
    ZeroDiagnosticsCapacity,

    /// A zero handshake timeout would fail every attempt.
    #[error("handshake timeout must be greater than zero")]
    ZeroHandshakeTimeout,

    /// An environment variable holds something unparseable.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    /// No Tokio runtime to run timers on.
    #[error("no Tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Any error the client surfaces from its layers.
///
/// Each variant converts from its layer's error with `?`.
#[derive(Debug, thiserror::Error)]
pub enum SkylinkError {
    /// A transport-level error (open, send, closed).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed frame, missing type, encode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An envelope could not be sent.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The client configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylink_connection::ConnectionState;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let skylink_err: SkylinkError = err.into();
        assert!(matches!(skylink_err, SkylinkError::Transport(_)));
        assert!(skylink_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let skylink_err: SkylinkError = ProtocolError::MissingType.into();
        assert!(matches!(skylink_err, SkylinkError::Protocol(_)));
    }

    #[test]
    fn test_from_send_error() {
        let err = SendError::NotConnected(ConnectionState::Connecting);
        let skylink_err: SkylinkError = err.into();
        assert!(matches!(skylink_err, SkylinkError::Send(_)));
        assert_eq!(skylink_err.to_string(), "not connected (state: connecting)");
    }

    #[test]
    fn test_from_config_error() {
        let skylink_err: SkylinkError = ConfigError::ZeroHeartbeatInterval.into();
        assert!(matches!(skylink_err, SkylinkError::Config(_)));
    }
}
