//! Logging setup for binaries and tests that embed the client.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_filter` (e.g. `"skylink=info"`) when `RUST_LOG`
/// is unset or invalid. Returns `false` if a global subscriber was
/// already installed, which is not an error.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_second_call_is_harmless() {
        init_tracing("skylink=debug");
        assert!(!init_tracing("skylink=debug"));
    }
}
