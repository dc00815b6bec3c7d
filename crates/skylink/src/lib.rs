//! # Skylink
//!
//! Real-time messaging client for the mission dashboard backend.
//!
//! One WebSocket carries every live stream the dashboard shows: mission
//! updates, agent status, telemetry, risk alerts. Skylink keeps that socket
//! alive (heartbeat, exponential-backoff reconnect) and fans each inbound
//! message out to whoever subscribed to its kind, optionally narrowed to a
//! mission or agent room.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skylink::prelude::*;
//!
//! # async fn run() -> Result<(), SkylinkError> {
//! let client = SkylinkClient::builder()
//!     .config(ClientConfig::from_env()?)
//!     .build()?;
//!
//! let _alerts = client.subscribe(MessageKind::RiskAlert, |env| {
//!     println!("risk alert: {}", env.data());
//! });
//!
//! client.connect();
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! | Crate | Concern |
//! |-------|---------|
//! | `skylink-transport` | duplex socket, WebSocket implementation |
//! | `skylink-protocol` | envelope model, JSON codec |
//! | `skylink-timer` | one-shot timers, virtual clock for tests |
//! | `skylink-router` | subscription registry, fan-out, diagnostics |
//! | `skylink-connection` | state machine, heartbeat, reconnect |

mod client;
mod config;
mod error;
pub mod telemetry;

pub use client::{SkylinkClient, SkylinkClientBuilder};
pub use config::{
    ClientConfig, ENV_HANDSHAKE_TIMEOUT_SECS, ENV_HEARTBEAT_SECS, ENV_MAX_RECONNECT_ATTEMPTS,
    ENV_RECONNECT_BASE_MS, ENV_URL,
};
pub use error::{ConfigError, SkylinkError};

pub use skylink_connection::{
    ConnectionState, ConnectionStatus, HeartbeatState, ReconnectPolicy, SendError,
};
pub use skylink_protocol::{Codec, Envelope, JsonCodec, MessageKind, ProtocolError, RoomId};
pub use skylink_router::{Diagnostic, Listener, RouteKey, SubscriptionHandle};
pub use skylink_timer::{ManualScheduler, Scheduler, TokioScheduler};
#[cfg(feature = "mock")]
pub use skylink_transport::MockTransport;
pub use skylink_transport::{CloseCode, Transport, TransportError, TransportEvent};

pub mod prelude {
    //! Everything an application usually needs.
    pub use crate::{
        ClientConfig, ConnectionState, ConnectionStatus, Diagnostic, Envelope, MessageKind,
        RoomId, RouteKey, SendError, SkylinkClient, SkylinkError, SubscriptionHandle,
    };
}
