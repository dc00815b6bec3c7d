//! Exponential reconnect backoff.

use std::time::Duration;

/// Decides whether and when to try again after the link drops.
///
/// Attempt `n` (1-based) waits `base * 2^(n-1)`. The counter goes back to
/// zero on every successful connect.
///
/// ```
/// use std::time::Duration;
/// use skylink_connection::ReconnectPolicy;
///
/// let mut policy = ReconnectPolicy::new(Duration::from_millis(1000), 3);
/// assert_eq!(policy.next_attempt(), Some((1, Duration::from_millis(1000))));
/// assert_eq!(policy.next_attempt(), Some((2, Duration::from_millis(2000))));
/// assert_eq!(policy.next_attempt(), Some((3, Duration::from_millis(4000))));
/// assert_eq!(policy.next_attempt(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_attempts: u32,
    current_attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            current_attempt: 0,
        }
    }

    /// Delay before attempt `attempt`. Saturates at `Duration::MAX`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Claims the next attempt, returning its number and delay.
    ///
    /// `None` once `max_attempts` have been used.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.is_exhausted() {
            return None;
        }
        self.current_attempt += 1;
        Some((self.current_attempt, self.delay_for(self.current_attempt)))
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_from_base() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(1000), 5);
        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_attempt())
            .map(|(_, d)| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert!(policy.is_exhausted());
    }

    #[test]
    fn test_reset_starts_over() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(250), 2);
        policy.next_attempt();
        policy.next_attempt();
        assert_eq!(policy.next_attempt(), None);

        policy.reset();
        assert_eq!(policy.current_attempt(), 0);
        assert_eq!(policy.next_attempt(), Some((1, Duration::from_millis(250))));
    }

    #[test]
    fn test_zero_max_attempts_never_retries() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1), 0);
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_attempt(), None);
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), u32::MAX);
        assert_eq!(policy.delay_for(64), Duration::MAX);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    }
}
