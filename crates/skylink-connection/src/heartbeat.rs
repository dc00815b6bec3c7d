//! Heartbeat ping/ack bookkeeping.

use std::time::{Duration, Instant};

/// Tracks the outstanding liveness ping on one connection.
///
/// Reset whenever a connection is established or torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatState {
    last_sent_at: Option<Instant>,
    last_ack_at: Option<Instant>,
    outstanding: bool,
}

impl HeartbeatState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records that a ping went out at `now`.
    pub fn record_ping(&mut self, now: Instant) {
        self.last_sent_at = Some(now);
        self.outstanding = true;
    }

    /// Records an ack at `now`; returns the round-trip time of the ping
    /// it answers, if one was outstanding.
    pub fn record_ack(&mut self, now: Instant) -> Option<Duration> {
        self.last_ack_at = Some(now);
        if !std::mem::take(&mut self.outstanding) {
            return None;
        }
        self.last_sent_at
            .map(|sent| now.saturating_duration_since(sent))
    }

    /// `true` while the last ping has not been answered.
    pub fn awaiting_ack(&self) -> bool {
        self.outstanding
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    pub fn last_ack_at(&self) -> Option<Instant> {
        self.last_ack_at
    }
}
