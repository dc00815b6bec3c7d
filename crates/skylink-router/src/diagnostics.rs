//! Non-fatal problems, reported instead of thrown.

use std::time::Duration;

use skylink_protocol::MessageKind;
use tokio::sync::broadcast;

/// Longest frame excerpt kept in a [`Diagnostic::ParseError`].
const FRAME_EXCERPT_CHARS: usize = 256;

/// Something went wrong that the client recovered from on its own.
///
/// Only [`Diagnostic::ReconnectExhausted`] is terminal; it is also
/// visible on the connection status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    /// An inbound frame could not be parsed and was dropped.
    #[error("dropped unparseable frame: {error}")]
    ParseError {
        error: String,
        /// The start of the offending frame.
        frame: String,
    },

    /// A listener panicked. Other listeners still ran.
    #[error("listener for `{kind}` panicked: {message}")]
    ListenerPanicked { kind: MessageKind, message: String },

    /// The transport failed to open, send, or stay up.
    #[error("transport error: {message}")]
    TransportError { message: String },

    /// No heartbeat acknowledgement arrived within one ping interval.
    #[error("no heartbeat ack within {interval:?}")]
    HeartbeatTimeout { interval: Duration },

    /// Every reconnect attempt failed; the client is not retrying.
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl Diagnostic {
    /// Builds a [`Diagnostic::ParseError`], trimming long frames.
    pub fn parse_error(error: impl ToString, frame: &str) -> Self {
        Self::ParseError {
            error: error.to_string(),
            frame: frame.chars().take(FRAME_EXCERPT_CHARS).collect(),
        }
    }
}

/// Fan-out channel for [`Diagnostic`]s.
///
/// Emitting never blocks and is a no-op when nobody is subscribed. Slow
/// receivers lose the oldest entries (`RecvError::Lagged`).
#[derive(Debug, Clone)]
pub struct Diagnostics {
    tx: broadcast::Sender<Diagnostic>,
}

impl Diagnostics {
    /// Default number of buffered diagnostics per receiver.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Creates a channel buffering up to `capacity` entries per receiver.
    ///
    /// # Panics
    /// Panics if `capacity` is zero (as `tokio::sync::broadcast` does).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Reports a diagnostic to every current receiver.
    pub fn emit(&self, diagnostic: Diagnostic) {
        // Err only means no receivers.
        let _ = self.tx.send(diagnostic);
    }

    /// A receiver for diagnostics emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
