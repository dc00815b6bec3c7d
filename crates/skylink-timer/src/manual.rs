//! Virtual-clock scheduler for deterministic tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::{Scheduler, TimerHandle, TimerTask};

/// Timers keyed by `(deadline, sequence)` so equal deadlines fire FIFO.
type TimerKey = (Duration, u64);

struct ManualState {
    origin: Instant,
    elapsed: Duration,
    next_seq: u64,
    timers: BTreeMap<TimerKey, TimerTask>,
    history: Vec<Duration>,
}

/// A [`Scheduler`] whose clock only moves when told to.
///
/// Clones share the same clock and timer queue, so a test can hand one
/// clone to the code under test and drive time with another.
///
/// ```
/// use std::time::Duration;
/// use skylink_timer::{ManualScheduler, Scheduler};
///
/// let clock = ManualScheduler::new();
/// clock.after(Duration::from_secs(2), Box::new(|| println!("fired")));
///
/// assert_eq!(clock.advance(Duration::from_secs(1)), 0);
/// assert_eq!(clock.advance(Duration::from_secs(1)), 1);
/// ```
#[derive(Clone)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    /// Creates a scheduler at virtual time zero with no timers.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                origin: Instant::now(),
                elapsed: Duration::ZERO,
                next_seq: 0,
                timers: BTreeMap::new(),
                history: Vec::new(),
            })),
        }
    }

    /// Virtual time since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.lock().timers.len()
    }

    /// Every delay passed to `after`, oldest first, cancelled ones included.
    pub fn scheduled_delays(&self) -> Vec<Duration> {
        self.lock().history.clone()
    }

    /// Time until the earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        let state = self.lock();
        state
            .timers
            .keys()
            .next()
            .map(|(deadline, _)| deadline.saturating_sub(state.elapsed))
    }

    /// Moves the clock forward by `by`, firing every timer that comes due.
    ///
    /// Timers fire in deadline order, one at a time, with the clock set to
    /// their deadline and the internal lock released, so a task may
    /// schedule or cancel timers. A timer scheduled by a task fires in the
    /// same call if its deadline falls inside the window.
    ///
    /// Returns the number of timers fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().elapsed.saturating_add(by);
        let mut fired = 0;

        loop {
            let task = {
                let mut state = self.lock();
                let due = matches!(
                    state.timers.first_key_value(),
                    Some(((deadline, _), _)) if *deadline <= target
                );
                if !due {
                    break;
                }
                let Some(((deadline, _), task)) = state.timers.pop_first() else {
                    break;
                };
                state.elapsed = state.elapsed.max(deadline);
                task
            };
            task();
            fired += 1;
        }

        self.lock().elapsed = target;
        trace!(fired, elapsed_ms = target.as_millis() as u64, "manual clock advanced");
        fired
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<ManualState>) -> MutexGuard<'_, ManualState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let key = {
            let mut state = self.lock();
            let key = (state.elapsed.saturating_add(delay), state.next_seq);
            state.next_seq += 1;
            state.history.push(delay);
            state.timers.insert(key, task);
            key
        };

        let weak: Weak<Mutex<ManualState>> = Arc::downgrade(&self.state);
        TimerHandle::new(move || {
            if let Some(state) = weak.upgrade() {
                lock_state(&state).timers.remove(&key);
            }
        })
    }

    fn now(&self) -> Instant {
        let state = self.lock();
        state
            .origin
            .checked_add(state.elapsed)
            .unwrap_or(state.origin)
    }
}
