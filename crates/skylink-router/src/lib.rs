//! Inbound fan-out for Skylink.
//!
//! One socket carries many logical streams. This crate turns each inbound
//! frame into an [`Envelope`](skylink_protocol::Envelope) and hands it to
//! every listener whose [`RouteKey`] matches.
//!
//! # Key types
//!
//! - [`Registry`]: who is listening for what; safe to change from any
//!   thread, including from inside a listener
//! - [`SubscriptionHandle`]: removes exactly one registration
//! - [`Router`]: parse + dispatch, with per-listener panic isolation
//! - [`Diagnostics`]: broadcast channel for non-fatal problems
//!
//! # Matching
//!
//! A key without a room matches every envelope of its kind. A key with a
//! room matches only envelopes routed to that room. An envelope for
//! `mission:7` therefore reaches both kinds of listener, in the order they
//! registered.

mod diagnostics;
mod registry;
mod router;

pub use diagnostics::{Diagnostic, Diagnostics};
pub use registry::{Listener, Registry, RouteKey, SubscriptionHandle};
pub use router::Router;
