//! Transport abstraction layer for Skylink.
//!
//! [`Transport`] opens sockets and [`Connection`] is the handle to one
//! open socket, the duplex link the client keeps open to its backend. The rest of the
//! stack only ever sees four things happen on a socket, modelled as
//! [`TransportEvent`]: it opened, a text frame arrived, it closed with a
//! code, or it failed.
//!
//! ```text
//! Connection Manager ──open/send/close──→ Transport (this crate)
//!        ↑                                      │
//!        └──────────── TransportEvent ──────────┘  (via EventSink)
//! ```
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client transport via `tokio-tungstenite`
//! - `mock`: in-memory [`MockTransport`] for deterministic tests

mod error;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "mock")]
pub use mock::MockTransport;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// Shared by every transport in the process.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Tags a socket in logs and distinguishes stale events from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id. Tests use this; transports use [`next`](Self::next).
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique connection ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A WebSocket-style close code.
///
/// Only `1000` counts as a normal close. Everything else (including the
/// synthetic `1006` reported when a stream ends without a close frame)
/// is treated as abnormal by the layers above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// Orderly shutdown requested by either side.
    pub const NORMAL: Self = Self(1000);
    /// The peer is going away (server restart, page unload).
    pub const GOING_AWAY: Self = Self(1001);
    /// The connection dropped without a close frame.
    pub const ABNORMAL: Self = Self(1006);
    /// The client gave up on a connection that stopped answering pings.
    pub const HEARTBEAT_TIMEOUT: Self = Self(4000);

    /// Wraps a raw close code.
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the raw close code.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// `true` only for [`CloseCode::NORMAL`].
    pub fn is_normal(self) -> bool {
        self == Self::NORMAL
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something that happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed; frames can now flow both ways.
    Opened,
    /// A text frame arrived.
    Frame(String),
    /// The socket closed with the given code.
    Closed { code: CloseCode, reason: String },
    /// The socket failed. No further events follow for this connection.
    Error(String),
}

/// Callback a transport uses to report [`TransportEvent`]s.
///
/// Cheap to clone; every clone reports to the same place.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(TransportEvent) + Send + Sync>);

impl EventSink {
    /// Wraps a callback.
    pub fn new(f: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Reports one event.
    pub fn emit(&self, event: TransportEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink(..)")
    }
}

/// Opens new outbound connections.
///
/// Implementations must never invoke the [`EventSink`] from inside
/// `open`, [`Connection::send`] or [`Connection::close`]: the caller may
/// be holding a lock that the sink also needs. Events are delivered later,
/// from the transport's own task.
pub trait Transport: Send + Sync + 'static {
    /// Starts opening a connection to `url`.
    ///
    /// Returns as soon as the attempt is under way. Success is reported
    /// with [`TransportEvent::Opened`], failure with
    /// [`TransportEvent::Error`] or [`TransportEvent::Closed`].
    fn open(
        &self,
        url: &str,
        events: EventSink,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

/// A single connection that can send text frames and be closed.
pub trait Connection: Send + Sync {
    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Queues a text frame for the remote peer.
    fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Closes the connection with the given code. Idempotent.
    fn close(&self, code: CloseCode, reason: &str);
}
