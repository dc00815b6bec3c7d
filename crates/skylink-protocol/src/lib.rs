//! Wire protocol for Skylink.
//!
//! This crate defines what travels on the socket:
//!
//! - **Types** ([`Envelope`], [`MessageKind`], [`RoomId`]): the JSON
//!   object `{ "type", "data", "timestamp", "id" }` and its routing keys.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes are
//!   turned into text frames and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! ```text
//! Transport (text frames) → Protocol (Envelope) → Router (listeners)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{Envelope, MessageKind, RoomId};
