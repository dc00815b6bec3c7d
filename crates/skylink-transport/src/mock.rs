//! In-memory transport for deterministic tests.
//!
//! Nothing happens on its own: the test decides when a connection opens,
//! which frames arrive and how it closes, by calling [`MockTransport::emit`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    CloseCode, Connection, ConnectionId, EventSink, Transport, TransportError,
    TransportEvent,
};

#[derive(Debug)]
struct MockConnectionRecord {
    id: ConnectionId,
    url: String,
    sink: EventSink,
    sent: Vec<String>,
    closed: Option<(CloseCode, String)>,
}

#[derive(Debug, Default)]
struct MockState {
    connections: Vec<MockConnectionRecord>,
    fail_next_open: Option<String>,
}

/// A [`Transport`] that records every call and lets the test inject events.
///
/// Clones share the same recorded state, so a test can hand one clone to
/// the client and keep another for assertions.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates an empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` call fail synchronously with `reason`.
    pub fn fail_next_open(&self, reason: &str) {
        self.lock().fail_next_open = Some(reason.to_owned());
    }

    /// Number of connections opened so far.
    pub fn open_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// URLs passed to each successful `open`, oldest first.
    pub fn opened_urls(&self) -> Vec<String> {
        self.lock().connections.iter().map(|c| c.url.clone()).collect()
    }

    /// The most recently opened connection.
    pub fn latest_connection(&self) -> Option<ConnectionId> {
        self.lock().connections.last().map(|c| c.id)
    }

    /// Every frame sent on any connection, oldest first.
    pub fn sent_frames(&self) -> Vec<String> {
        self.lock()
            .connections
            .iter()
            .flat_map(|c| c.sent.iter().cloned())
            .collect()
    }

    /// Close calls made by the client, as `(connection, code)`.
    pub fn closes(&self) -> Vec<(ConnectionId, CloseCode)> {
        self.lock()
            .connections
            .iter()
            .filter_map(|c| c.closed.as_ref().map(|(code, _)| (c.id, *code)))
            .collect()
    }

    /// Delivers `event` on the most recently opened connection.
    ///
    /// Returns `false` if nothing has been opened yet.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.latest_connection() {
            Some(id) => self.emit_to(id, event),
            None => false,
        }
    }

    /// Shorthand for emitting a text frame on the latest connection.
    pub fn emit_frame(&self, frame: &str) -> bool {
        self.emit(TransportEvent::Frame(frame.to_owned()))
    }

    /// Delivers `event` on a specific (possibly stale) connection.
    pub fn emit_to(&self, id: ConnectionId, event: TransportEvent) -> bool {
        // Clone the sink and drop the lock before calling out: the sink
        // may call straight back into `send` or `close`.
        let sink = self
            .lock()
            .connections
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.sink.clone());
        match sink {
            Some(sink) => {
                sink.emit(event);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn open(
        &self,
        url: &str,
        events: EventSink,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let mut state = self.lock();
        if let Some(reason) = state.fail_next_open.take() {
            return Err(TransportError::OpenFailed(reason));
        }

        let id = ConnectionId::next();
        state.connections.push(MockConnectionRecord {
            id,
            url: url.to_owned(),
            sink: events,
            sent: Vec::new(),
            closed: None,
        });

        Ok(Box::new(MockConnection {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    id: ConnectionId,
    state: Arc<Mutex<MockState>>,
}

impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, frame: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let record = state
            .connections
            .iter_mut()
            .find(|c| c.id == self.id)
            .ok_or_else(|| TransportError::ConnectionClosed(self.id.to_string()))?;
        if record.closed.is_some() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        record.sent.push(frame.to_owned());
        Ok(())
    }

    fn close(&self, code: CloseCode, reason: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = state.connections.iter_mut().find(|c| c.id == self.id) {
            if record.closed.is_none() {
                record.closed = Some((code, reason.to_owned()));
            }
        }
    }
}
