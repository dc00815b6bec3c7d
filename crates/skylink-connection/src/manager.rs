//! The connection state machine.
//!
//! # Concurrency note
//!
//! Transport events arrive on the transport's task, timers fire on the
//! scheduler's, and the application calls in from wherever it likes. All
//! of them funnel through one `Mutex<Link>`, so transitions never overlap.
//!
//! Every socket and timer is tagged with the `epoch` current when it was
//! created. Any transition that abandons a socket bumps the epoch, and
//! callbacks carrying an old epoch are ignored. That is what keeps a late
//! `Closed` from a replaced socket, or a reconnect timer that lost a race
//! with `disconnect()`, from touching the current connection.
//!
//! Listeners are never called with the lock held. A frame's epoch is
//! checked once when it is classified and again right before dispatch.
//! A `disconnect()` on another thread that lands between that second
//! check and the listeners running cannot stop that one frame; every
//! frame that arrives after `disconnect()` returns is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use skylink_protocol::{Envelope, MessageKind};
use skylink_router::{Diagnostic, Router};
use skylink_timer::{Scheduler, TimerHandle};
use skylink_transport::{CloseCode, Connection, EventSink, Transport, TransportEvent};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::{
    ConnectionConfig, ConnectionState, ConnectionStatus, HeartbeatState,
    ReconnectPolicy, SendError,
};

/// Owns the socket and drives it through its lifecycle.
///
/// `connect`, `reconnect` and `disconnect` return immediately; watch
/// [`ConnectionManager::watch_status`] to see what happened. Dropping the
/// manager disconnects it.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    router: Arc<Router>,
    status: watch::Sender<ConnectionStatus>,
    link: Mutex<Link>,
}

/// Everything a transition may touch.
struct Link {
    state: ConnectionState,
    policy: ReconnectPolicy,
    heartbeat: HeartbeatState,
    epoch: u64,
    socket: Option<Box<dyn Connection>>,
    reconnect_timer: Option<TimerHandle>,
    heartbeat_timer: Option<TimerHandle>,
    exhausted: bool,
}

/// What to do with an inbound frame once the lock is released.
enum Inbound {
    Dispatch(Envelope),
    Drop,
}

impl ConnectionManager {
    /// Creates a manager in `Disconnected`. Nothing is opened until
    /// [`connect`](Self::connect) is called.
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
        router: Arc<Router>,
    ) -> Self {
        let policy = ReconnectPolicy::new(
            config.reconnect_base_delay,
            config.max_reconnect_attempts,
        );
        let (status, _rx) = watch::channel(ConnectionStatus::default());

        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                scheduler,
                router,
                status,
                link: Mutex::new(Link {
                    state: ConnectionState::Disconnected,
                    policy,
                    heartbeat: HeartbeatState::default(),
                    epoch: 0,
                    socket: None,
                    reconnect_timer: None,
                    heartbeat_timer: None,
                    exhausted: false,
                }),
            }),
        }
    }

    /// Starts connecting. Only acts from `Disconnected`.
    ///
    /// Cancels a pending reconnect and starts the attempt count over.
    pub fn connect(&self) {
        self.shared.connect();
    }

    /// Closes the socket with a normal code and stops all timers.
    ///
    /// Observers see `Closing` then `Disconnected`. Nothing reconnects
    /// until `connect` or `reconnect` is called again.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Drops the current socket (if any) and opens a fresh one.
    ///
    /// A no-op while `Connecting`. Starts the attempt count over.
    pub fn reconnect(&self) {
        self.shared.reconnect();
    }

    /// Sends one envelope, stamping its timestamp if absent.
    ///
    /// # Errors
    /// [`SendError::NotConnected`] unless the state is `Connected`; in that
    /// case the transport is not touched.
    pub fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.shared.send(envelope)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().policy.current_attempt()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// A receiver that sees every published [`ConnectionStatus`].
    ///
    /// Like any `watch` channel it only keeps the latest value, so a slow
    /// reader may skip short-lived states such as `Closing`.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.shared.router
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------
    // Application-initiated transitions
    // -----------------------------------------------------------------

    fn connect(self: &Arc<Self>) {
        let mut link = self.lock();
        if link.state != ConnectionState::Disconnected {
            debug!(state = %link.state, "connect ignored");
            return;
        }
        cancel(&mut link.reconnect_timer);
        link.policy.reset();
        link.exhausted = false;
        self.open(&mut link);
    }

    fn disconnect(&self) {
        let mut link = self.lock();
        cancel(&mut link.reconnect_timer);
        cancel(&mut link.heartbeat_timer);

        let was = link.state;
        if let Some(socket) = link.socket.take() {
            link.state = ConnectionState::Closing;
            self.publish(&link);
            socket.close(CloseCode::NORMAL, "client disconnect");
        }

        link.epoch += 1;
        link.state = ConnectionState::Disconnected;
        link.heartbeat.reset();
        link.policy.reset();
        link.exhausted = false;
        self.publish(&link);

        if was != ConnectionState::Disconnected {
            info!(url = %self.config.url, "disconnected");
        }
    }

    fn reconnect(self: &Arc<Self>) {
        let mut link = self.lock();
        if link.state == ConnectionState::Connecting {
            debug!("reconnect ignored: already connecting");
            return;
        }

        cancel(&mut link.reconnect_timer);
        cancel(&mut link.heartbeat_timer);
        if let Some(socket) = link.socket.take() {
            if link.state == ConnectionState::Connected {
                link.state = ConnectionState::Closing;
                self.publish(&link);
            }
            socket.close(CloseCode::NORMAL, "client reconnect");
        }

        link.policy.reset();
        link.exhausted = false;
        info!(url = %self.config.url, "reconnecting on request");
        self.open(&mut link);
    }

    fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        let link = self.lock();
        let socket = match (&link.state, &link.socket) {
            (ConnectionState::Connected, Some(socket)) => socket,
            (state, _) => {
                trace!(kind = %envelope.kind(), %state, "send refused");
                return Err(SendError::NotConnected(*state));
            }
        };

        let envelope = envelope.ensure_timestamp();
        let frame = self.router.codec().encode(&envelope)?;
        socket.send(&frame)?;
        trace!(kind = %envelope.kind(), conn_id = %socket.id(), "envelope sent");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Opening and losing the socket
    // -----------------------------------------------------------------

    /// Opens a socket for a fresh epoch. Caller holds the lock.
    fn open(self: &Arc<Self>, link: &mut Link) {
        link.epoch += 1;
        let epoch = link.epoch;
        link.state = ConnectionState::Connecting;
        link.heartbeat.reset();
        self.publish(link);

        let weak: Weak<Shared> = Arc::downgrade(self);
        let sink = EventSink::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_transport_event(epoch, event);
            }
        });

        debug!(
            url = %self.config.url,
            attempt = link.policy.current_attempt(),
            epoch,
            "opening connection"
        );
        match self.transport.open(&self.config.url, sink) {
            Ok(socket) => link.socket = Some(socket),
            Err(e) => {
                warn!(error = %e, "transport open failed");
                self.router.diagnostics().emit(Diagnostic::TransportError {
                    message: e.to_string(),
                });
                self.connection_lost(link, None);
            }
        }
    }

    /// Drops to `Disconnected` without scheduling anything.
    fn teardown(&self, link: &mut Link, close: Option<(CloseCode, &str)>) {
        cancel(&mut link.heartbeat_timer);
        cancel(&mut link.reconnect_timer);
        if let Some(socket) = link.socket.take() {
            if let Some((code, reason)) = close {
                socket.close(code, reason);
            }
        }
        link.epoch += 1;
        link.heartbeat.reset();
        link.state = ConnectionState::Disconnected;
    }

    /// The abnormal path: tear down, then back off and retry.
    fn connection_lost(self: &Arc<Self>, link: &mut Link, close: Option<(CloseCode, &str)>) {
        self.teardown(link, close);
        self.schedule_reconnect(link);
        self.publish(link);
    }

    fn schedule_reconnect(self: &Arc<Self>, link: &mut Link) {
        let Some((attempt, delay)) = link.policy.next_attempt() else {
            link.exhausted = true;
            let attempts = link.policy.max_attempts();
            warn!(attempts, url = %self.config.url, "reconnect attempts exhausted");
            self.router
                .diagnostics()
                .emit(Diagnostic::ReconnectExhausted { attempts });
            return;
        };

        let delay = delay.saturating_add(self.jitter());
        info!(
            attempt,
            max_attempts = link.policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );

        let epoch = link.epoch;
        let weak = Arc::downgrade(self);
        link.reconnect_timer = Some(self.scheduler.after(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_reconnect_due(epoch);
                }
            }),
        ));
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.config.reconnect_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }

    fn on_reconnect_due(self: &Arc<Self>, epoch: u64) {
        let mut link = self.lock();
        if link.epoch != epoch || link.state != ConnectionState::Disconnected {
            trace!(epoch, "stale reconnect timer ignored");
            return;
        }
        link.reconnect_timer = None;
        self.open(&mut link);
    }

    // -----------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------

    fn schedule_heartbeat(self: &Arc<Self>, link: &mut Link) {
        let epoch = link.epoch;
        let weak = Arc::downgrade(self);
        link.heartbeat_timer = Some(self.scheduler.after(
            self.config.heartbeat_interval,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_heartbeat_due(epoch);
                }
            }),
        ));
    }

    fn on_heartbeat_due(self: &Arc<Self>, epoch: u64) {
        let mut link = self.lock();
        if link.epoch != epoch || link.state != ConnectionState::Connected {
            trace!(epoch, "stale heartbeat timer ignored");
            return;
        }
        link.heartbeat_timer = None;

        if link.heartbeat.awaiting_ack() {
            let interval = self.config.heartbeat_interval;
            warn!(interval_ms = interval.as_millis() as u64, "heartbeat timed out");
            self.router
                .diagnostics()
                .emit(Diagnostic::HeartbeatTimeout { interval });
            self.connection_lost(
                &mut link,
                Some((CloseCode::HEARTBEAT_TIMEOUT, "heartbeat timeout")),
            );
            return;
        }

        let ping = Envelope::new(MessageKind::Ping, Value::Null).ensure_timestamp();
        let sent = match (self.router.codec().encode(&ping), &link.socket) {
            (Ok(frame), Some(socket)) => socket.send(&frame).map_err(|e| e.to_string()),
            (Err(e), _) => Err(e.to_string()),
            (_, None) => Err("no socket".to_owned()),
        };

        match sent {
            Ok(()) => {
                let now = self.scheduler.now();
                link.heartbeat.record_ping(now);
                trace!("heartbeat ping sent");
                self.schedule_heartbeat(&mut link);
            }
            Err(message) => {
                warn!(error = %message, "heartbeat ping failed");
                self.router
                    .diagnostics()
                    .emit(Diagnostic::TransportError { message });
                self.connection_lost(&mut link, None);
            }
        }
    }

    // -----------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------

    fn on_transport_event(self: &Arc<Self>, epoch: u64, event: TransportEvent) {
        if let TransportEvent::Frame(frame) = event {
            self.on_frame(epoch, &frame);
            return;
        }

        let mut link = self.lock();
        if link.epoch != epoch {
            trace!(epoch, current = link.epoch, "stale transport event ignored");
            return;
        }

        match (event, link.state) {
            (TransportEvent::Opened, ConnectionState::Connecting) => {
                link.state = ConnectionState::Connected;
                link.policy.reset();
                link.exhausted = false;
                link.heartbeat.reset();
                self.schedule_heartbeat(&mut link);
                self.publish(&link);
                info!(url = %self.config.url, "connected");
            }
            (TransportEvent::Closed { code, reason }, ConnectionState::Connected)
                if code.is_normal() =>
            {
                info!(%code, %reason, "server closed connection normally");
                self.teardown(&mut link, None);
                self.publish(&link);
            }
            (
                TransportEvent::Closed { code, reason },
                ConnectionState::Connecting | ConnectionState::Connected,
            ) => {
                warn!(%code, %reason, state = %link.state, "connection closed abnormally");
                self.connection_lost(&mut link, None);
            }
            (TransportEvent::Error(message), ConnectionState::Connecting | ConnectionState::Connected) => {
                warn!(error = %message, state = %link.state, "transport error");
                self.router
                    .diagnostics()
                    .emit(Diagnostic::TransportError { message });
                self.connection_lost(&mut link, None);
            }
            (event, state) => {
                debug!(?event, %state, "transport event ignored in current state");
            }
        }
    }

    fn on_frame(&self, epoch: u64, frame: &str) {
        let inbound = {
            let mut link = self.lock();
            if link.epoch != epoch || link.state != ConnectionState::Connected {
                trace!(epoch, "frame on inactive connection dropped");
                return;
            }
            self.classify(&mut link, frame)
        };

        let Inbound::Dispatch(envelope) = inbound else {
            return;
        };
        if self.lock().epoch != epoch {
            trace!(epoch, kind = %envelope.kind(), "connection replaced before dispatch");
            return;
        }
        self.router.dispatch(&envelope);
    }

    /// Consumes heartbeat traffic; everything else goes to the router.
    fn classify(&self, link: &mut Link, frame: &str) -> Inbound {
        let envelope = match self.router.parse(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.router.report_parse_error(&e, frame);
                return Inbound::Drop;
            }
        };

        if envelope.is_heartbeat_ack() {
            let now = self.scheduler.now();
            match link.heartbeat.record_ack(now) {
                Some(rtt) => debug!(rtt_ms = rtt.as_millis() as u64, "heartbeat ack"),
                None => trace!("unsolicited heartbeat ack"),
            }
            return Inbound::Drop;
        }

        if envelope.kind() == &MessageKind::Ping {
            let pong = Envelope::new(MessageKind::Pong, Value::Null).ensure_timestamp();
            if let (Ok(reply), Some(socket)) =
                (self.router.codec().encode(&pong), &link.socket)
            {
                if let Err(e) = socket.send(&reply) {
                    debug!(error = %e, "pong reply failed");
                }
            }
            return Inbound::Drop;
        }

        Inbound::Dispatch(envelope)
    }

    fn publish(&self, link: &Link) {
        let next = ConnectionStatus {
            state: link.state,
            reconnect_attempts: link.policy.current_attempt(),
            exhausted: link.exhausted,
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

fn cancel(timer: &mut Option<TimerHandle>) {
    if let Some(mut handle) = timer.take() {
        handle.cancel();
    }
}
