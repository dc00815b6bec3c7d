//! WebSocket client transport using `tokio-tungstenite`.

use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;

use crate::{
    CloseCode, Connection, ConnectionId, EventSink, Transport, TransportError,
    TransportEvent,
};

/// Time allowed for the peer to answer our close frame.
const CLOSE_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands from a [`WebSocketConnection`] handle to its I/O task.
enum Outbound {
    Frame(String),
    Close { code: CloseCode, reason: String },
}

/// A [`Transport`] that dials WebSocket servers.
///
/// Each connection runs in its own task on the captured runtime, so
/// `open` can be called from any thread (including non-async code).
///
/// A handshake that does not finish within the handshake timeout is
/// reported as [`TransportEvent::Error`].
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    runtime: Handle,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Handshake timeout used unless overridden.
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a transport that spawns connection tasks on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            handshake_timeout: Self::DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Gives up on a handshake after `timeout`.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Creates a transport bound to the runtime of the calling context.
    pub fn current() -> Result<Self, TransportError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| TransportError::NoRuntime(e.to_string()))
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        url: &str,
        events: EventSink,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let id = ConnectionId::next();
        let (tx, rx) = mpsc::unbounded_channel();

        tracing::debug!(%id, url, "opening WebSocket connection");
        self.runtime.spawn(run_connection(
            id,
            url.to_owned(),
            self.handshake_timeout,
            rx,
            events,
        ));

        Ok(Box::new(WebSocketConnection { id, outbound: tx }))
    }
}

/// Handle to a single WebSocket connection's I/O task.
///
/// Dropping the handle closes the connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection for WebSocketConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, frame: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Frame(frame.to_owned()))
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    fn close(&self, code: CloseCode, reason: &str) {
        // The task may already be gone; closing twice is fine.
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

/// Drives one connection: handshake, then pumps frames both ways until
/// either side closes.
async fn run_connection(
    id: ConnectionId,
    url: String,
    handshake_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSink,
) {
    let connect =
        tokio::time::timeout(handshake_timeout, tokio_tungstenite::connect_async(url.as_str()));
    tokio::pin!(connect);

    let ws = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(Ok((ws, _response))) => break ws,
                Ok(Err(e)) => {
                    tracing::debug!(%id, error = %e, "WebSocket handshake failed");
                    events.emit(TransportEvent::Error(e.to_string()));
                    return;
                }
                Err(_elapsed) => {
                    tracing::debug!(%id, ?handshake_timeout, "WebSocket handshake timed out");
                    events.emit(TransportEvent::Error(format!(
                        "handshake timed out after {handshake_timeout:?}"
                    )));
                    return;
                }
            },
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Frame(_)) => {
                    tracing::trace!(%id, "dropping frame sent before open");
                }
                Some(Outbound::Close { .. }) | None => {
                    tracing::debug!(%id, "closed before handshake completed");
                    return;
                }
            },
        }
    };

    tracing::debug!(%id, "WebSocket connection open");
    events.emit(TransportEvent::Opened);

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        tracing::debug!(%id, error = %e, "WebSocket send failed");
                        events.emit(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: WsCloseCode::from(code.as_u16()),
                        reason: reason.into(),
                    };
                    outbound.close();
                    match sink.send(Message::Close(Some(frame))).await {
                        Ok(()) => {
                            await_close_reply(id, &mut stream, CLOSE_REPLY_TIMEOUT).await;
                        }
                        Err(e) => tracing::debug!(%id, error = %e, "close frame not delivered"),
                    }
                    // Caller-initiated: nobody is waiting for an event.
                    return;
                }
                None => {
                    if sink.close().await.is_ok() {
                        await_close_reply(id, &mut stream, CLOSE_REPLY_TIMEOUT).await;
                    }
                    return;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => events.emit(TransportEvent::Frame(text)),
                        Err(_) => {
                            tracing::debug!(%id, "dropping non-UTF-8 binary frame");
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (
                            CloseCode::new(u16::from(f.code)),
                            f.reason.as_str().to_owned(),
                        ),
                        None => (CloseCode::NORMAL, String::new()),
                    };
                    tracing::debug!(%id, %code, "peer closed connection");
                    events.emit(TransportEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {} // ping/pong answered by tungstenite
                Some(Err(e)) => {
                    tracing::debug!(%id, error = %e, "WebSocket receive failed");
                    events.emit(TransportEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    events.emit(TransportEvent::Closed {
                        code: CloseCode::ABNORMAL,
                        reason: "stream ended without close frame".into(),
                    });
                    return;
                }
            },
        }
    }
}

/// Reads (and discards) inbound messages until the peer answers our close
/// frame, the stream ends, or `timeout` passes.
///
/// Returns `true` if the close handshake completed.
async fn await_close_reply<S>(id: ConnectionId, stream: &mut S, timeout: Duration) -> bool
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let drain = async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) => return true,
                Ok(_) => tracing::trace!(%id, "dropping message received while closing"),
                Err(_) => return false,
            }
        }
        false
    };
    match tokio::time::timeout(timeout, drain).await {
        Ok(replied) => replied,
        Err(_) => {
            tracing::debug!(%id, "peer did not answer close frame");
            false
        }
    }
}
