//! Client configuration: defaults, environment overrides, validation.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use skylink_connection::ConnectionConfig;
use skylink_router::Diagnostics;
use url::Url;

use crate::ConfigError;

/// Environment variable for the WebSocket URL.
pub const ENV_URL: &str = "SKYLINK_WS_URL";
/// Environment variable for the reconnect base delay, in milliseconds.
pub const ENV_RECONNECT_BASE_MS: &str = "SKYLINK_RECONNECT_BASE_MS";
/// Environment variable for the maximum number of reconnect attempts.
pub const ENV_MAX_RECONNECT_ATTEMPTS: &str = "SKYLINK_MAX_RECONNECT_ATTEMPTS";
/// Environment variable for the heartbeat interval, in seconds.
pub const ENV_HEARTBEAT_SECS: &str = "SKYLINK_HEARTBEAT_SECS";
/// Environment variable for the WebSocket handshake timeout, in seconds.
pub const ENV_HANDSHAKE_TIMEOUT_SECS: &str = "SKYLINK_HANDSHAKE_TIMEOUT_SECS";

/// Everything needed to build a [`SkylinkClient`](crate::SkylinkClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Delay before the first reconnect attempt. Doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Reconnect attempts before giving up. 0 means never retry.
    pub max_reconnect_attempts: u32,
    /// Time between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Upper bound of random delay added to each reconnect. Zero by default.
    pub reconnect_jitter: Duration,
    /// Diagnostics buffered per receiver before the oldest are dropped.
    pub diagnostics_capacity: usize,
    /// How long the WebSocket upgrade may take before the attempt counts
    /// as failed. Defaults to the heartbeat interval.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let conn = ConnectionConfig::default();
        Self {
            url: conn.url,
            reconnect_base_delay: conn.reconnect_base_delay,
            max_reconnect_attempts: conn.max_reconnect_attempts,
            heartbeat_interval: conn.heartbeat_interval,
            reconnect_jitter: conn.reconnect_jitter,
            diagnostics_capacity: Diagnostics::DEFAULT_CAPACITY,
            handshake_timeout: conn.heartbeat_interval,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `SKYLINK_*` environment variables.
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] if a numeric variable doesn't parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through
    /// `lookup` instead of the process environment.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_URL).filter(|s| !s.trim().is_empty()) {
            config.url = url.trim().to_owned();
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_RECONNECT_BASE_MS)? {
            config.reconnect_base_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32>(&lookup, ENV_MAX_RECONNECT_ATTEMPTS)? {
            config.max_reconnect_attempts = n;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_HEARTBEAT_SECS)? {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_HANDSHAKE_TIMEOUT_SECS)? {
            config.handshake_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Checks the URL and timings.
    ///
    /// # Errors
    /// - [`ConfigError::InvalidUrl`] if the URL doesn't parse.
    /// - [`ConfigError::UnsupportedScheme`] unless it is `ws` or `wss`.
    /// - [`ConfigError::ZeroHeartbeatInterval`] for a zero interval.
    /// - [`ConfigError::ZeroDiagnosticsCapacity`] for a zero capacity.
    /// - [`ConfigError::ZeroHandshakeTimeout`] for a zero handshake timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.url).map_err(|source| ConfigError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_owned())),
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        if self.diagnostics_capacity == 0 {
            return Err(ConfigError::ZeroDiagnosticsCapacity);
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::ZeroHandshakeTimeout);
        }
        Ok(())
    }

    /// The subset the connection manager needs.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.url.clone(),
            reconnect_base_delay: self.reconnect_base_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_jitter: self.reconnect_jitter,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let parsed = raw.trim().parse::<T>();
    match parsed {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::InvalidValue {
            key: key.to_owned(),
            value: raw,
        }),
    }
}
