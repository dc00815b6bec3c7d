//! Connection management for Skylink.
//!
//! Owns the one socket a client keeps open and decides what happens to it:
//!
//! ```text
//!                 connect() / reconnect()
//!   Disconnected ─────────────────────────→ Connecting
//!        ↑  ↑                                   │ opened
//!        │  └── error / close / no pong ──┐     ▼
//!        │      (backoff, then retry)     └─ Connected
//!        └──────────── disconnect() ───── Closing
//! ```
//!
//! # Key types
//!
//! - [`ConnectionManager`]: the state machine, heartbeat, and reconnects
//! - [`ConnectionState`] / [`ConnectionStatus`]: what observers see
//! - [`ReconnectPolicy`]: exponential backoff with an attempt cap
//! - [`HeartbeatState`]: ping/ack bookkeeping
//! - [`ConnectionConfig`]: URL and timings
//! - [`SendError`]: why an outbound envelope was not sent

mod backoff;
mod config;
mod error;
mod heartbeat;
mod manager;
mod state;

pub use backoff::ReconnectPolicy;
pub use config::ConnectionConfig;
pub use error::SendError;
pub use heartbeat::HeartbeatState;
pub use manager::ConnectionManager;
pub use state::{ConnectionState, ConnectionStatus};
