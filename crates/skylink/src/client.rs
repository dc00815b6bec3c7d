//! `SkylinkClient` builder and facade.
//!
//! The one object the rest of an application holds. Building it wires a
//! registry and router into a connection manager over the chosen
//! transport and scheduler.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use skylink_connection::{ConnectionManager, ConnectionState, ConnectionStatus, SendError};
use skylink_protocol::{Envelope, MessageKind, RoomId};
use skylink_router::{
    Diagnostic, Diagnostics, Listener, Registry, RouteKey, Router, SubscriptionHandle,
};
use skylink_timer::{Scheduler, TokioScheduler};
use skylink_transport::{Transport, WebSocketTransport};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::{ClientConfig, ConfigError, SkylinkError};

/// Builder for configuring a [`SkylinkClient`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use skylink::prelude::*;
///
/// # async fn run() -> Result<(), SkylinkError> {
/// let client = SkylinkClient::builder()
///     .url("ws://localhost:8000/api/v1/ws/")
///     .heartbeat_interval(Duration::from_secs(15))
///     .build()?;
/// client.connect();
/// # Ok(())
/// # }
/// ```
pub struct SkylinkClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl SkylinkClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            scheduler: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_base_delay = delay;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn reconnect_jitter(mut self, jitter: Duration) -> Self {
        self.config.reconnect_jitter = jitter;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.config.diagnostics_capacity = capacity;
        self
    }

    /// Uses `transport` instead of the WebSocket transport.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Uses `scheduler` instead of the Tokio scheduler.
    pub fn scheduler(mut self, scheduler: impl Scheduler) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Validates the configuration and builds a disconnected client.
    ///
    /// The default transport and scheduler bind to the current Tokio
    /// runtime, so call this from inside one unless both are supplied.
    ///
    /// # Errors
    /// [`SkylinkError::Config`] for an invalid configuration or a missing
    /// runtime, [`SkylinkError::Transport`] if the default transport
    /// can't be created.
    pub fn build(self) -> Result<SkylinkClient, SkylinkError> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                WebSocketTransport::current()?
                    .with_handshake_timeout(self.config.handshake_timeout),
            ),
        };
        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(
                TokioScheduler::current()
                    .map_err(|e| ConfigError::NoRuntime(e.to_string()))?,
            ),
        };

        let registry = Registry::new();
        let diagnostics = Diagnostics::new(self.config.diagnostics_capacity);
        let router = Arc::new(Router::new(registry.clone(), diagnostics.clone()));
        let manager = ConnectionManager::new(
            self.config.connection_config(),
            transport,
            scheduler,
            router,
        );

        debug!(url = %self.config.url, "client built");
        Ok(SkylinkClient {
            config: self.config,
            manager,
            registry,
            diagnostics,
        })
    }
}

impl Default for SkylinkClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A real-time messaging session with the backend.
///
/// Construct one per UI session and pass it (or an `Arc` of it) to
/// whoever needs it. Subscriptions may be made before connecting; they
/// simply see nothing until frames arrive. Dropping the client
/// disconnects it.
pub struct SkylinkClient {
    config: ClientConfig,
    manager: ConnectionManager,
    registry: Registry,
    diagnostics: Diagnostics,
}

impl SkylinkClient {
    /// Creates a new builder.
    pub fn builder() -> SkylinkClientBuilder {
        SkylinkClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Starts connecting. Returns immediately; watch the status.
    pub fn connect(&self) {
        self.manager.connect();
    }

    /// Closes the connection and cancels any pending reconnect.
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Replaces the connection with a fresh one. No-op while connecting.
    pub fn reconnect(&self) {
        self.manager.reconnect();
    }

    /// Disconnects and drops every subscription.
    pub fn shutdown(&self) {
        self.manager.disconnect();
        self.registry.clear();
    }

    // ---------------------------------------------------------------
    // Outbound
    // ---------------------------------------------------------------

    /// Sends one envelope if connected. Never queues.
    ///
    /// # Errors
    /// [`SendError::NotConnected`] unless connected.
    pub fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.manager.send(envelope)
    }

    /// Asks the backend for a mission's room traffic.
    ///
    /// Returns the room to subscribe to for envelopes about that mission.
    pub fn join_mission(&self, mission_id: impl fmt::Display) -> Result<RoomId, SendError> {
        let id = mission_id.to_string();
        self.send(
            Envelope::new(MessageKind::SubscribeMission, Value::Null)
                .with_field("mission_id", id.as_str()),
        )?;
        Ok(RoomId::mission(id))
    }

    /// Asks the backend for an agent's room traffic.
    pub fn join_agent(&self, agent_id: impl fmt::Display) -> Result<RoomId, SendError> {
        let id = agent_id.to_string();
        self.send(
            Envelope::new(MessageKind::SubscribeAgent, Value::Null)
                .with_field("agent_id", id.as_str()),
        )?;
        Ok(RoomId::agent(id))
    }

    /// Tells the backend to stop sending a room's traffic.
    ///
    /// Local subscriptions are left alone.
    pub fn leave_room(&self, room: &RoomId) -> Result<(), SendError> {
        self.send(
            Envelope::new(MessageKind::Unsubscribe, Value::Null)
                .with_field("room_id", room.backend_name()),
        )
    }

    // ---------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------

    /// Calls `f` for every envelope of `kind`.
    pub fn subscribe<F>(&self, kind: impl Into<MessageKind>, f: F) -> SubscriptionHandle
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.registry.subscribe(RouteKey::kind(kind), Arc::new(f))
    }

    /// Calls `f` for envelopes of `kind` routed to `room` only.
    pub fn subscribe_room<F>(
        &self,
        kind: impl Into<MessageKind>,
        room: RoomId,
        f: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.registry.subscribe(RouteKey::room(kind, room), Arc::new(f))
    }

    /// Registers a shared listener, so it can later be passed to
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe_listener(&self, key: RouteKey, listener: Listener) -> SubscriptionHandle {
        self.registry.subscribe(key, listener)
    }

    /// Removes `listener` under `key`, or every listener under `key` if
    /// `None`. Returns how many registrations were removed.
    pub fn unsubscribe(&self, key: &RouteKey, listener: Option<&Listener>) -> usize {
        self.registry.unsubscribe(key, listener)
    }

    /// Number of active registrations.
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    // ---------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.manager.reconnect_attempts()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    /// Receives every status change (state, attempts, exhausted flag).
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.manager.watch_status()
    }

    /// Receives diagnostics emitted from now on.
    pub fn diagnostics(&self) -> broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }

    /// The router behind this client, e.g. to feed captured frames by hand.
    pub fn router(&self) -> &Arc<Router> {
        self.manager.router()
    }
}

impl fmt::Debug for SkylinkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkylinkClient")
            .field("url", &self.config.url)
            .field("status", &self.status())
            .field("subscriptions", &self.registry.len())
            .finish()
    }
}
