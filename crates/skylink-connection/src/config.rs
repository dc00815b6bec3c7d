//! Connection configuration.

use std::time::Duration;

/// Where to connect and how to behave when the link drops.
///
/// Validation (URL syntax, non-zero heartbeat) happens in the client
/// facade before a manager is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Delay before the first reconnect attempt. Doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Reconnect attempts before giving up. 0 means never retry.
    pub max_reconnect_attempts: u32,
    /// Time between heartbeat pings. A ping still unanswered when the
    /// next one is due marks the link dead.
    pub heartbeat_interval: Duration,
    /// Upper bound of a uniform random delay added to each reconnect.
    pub reconnect_jitter: Duration,
}

impl ConnectionConfig {
    /// The backend's local development endpoint.
    pub const DEFAULT_URL: &'static str = "ws://localhost:8000/api/v1/ws/";

    /// Defaults with a different URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: Self::DEFAULT_URL.to_owned(),
            reconnect_base_delay: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
            reconnect_jitter: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let cfg = ConnectionConfig::default();
        assert_eq!(cfg.url, "ws://localhost:8000/api/v1/ws/");
        assert_eq!(cfg.reconnect_base_delay, Duration::from_secs(1));
        assert_eq!(cfg.max_reconnect_attempts, 5);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.reconnect_jitter, Duration::ZERO);
    }

    #[test]
    fn test_with_url_keeps_other_defaults() {
        let cfg = ConnectionConfig::with_url("ws://example:9000/ws");
        assert_eq!(cfg.url, "ws://example:9000/ws");
        assert_eq!(cfg.max_reconnect_attempts, 5);
    }
}
