//! One-shot timers for Skylink.
//!
//! The connection layer needs exactly two kinds of delayed work: the next
//! reconnect attempt and the next heartbeat ping. Both go through the
//! [`Scheduler`] trait so the clock can be swapped:
//!
//! - [`TokioScheduler`] sleeps on the Tokio timer wheel (production).
//! - [`ManualScheduler`] keeps a virtual clock that only moves when a test
//!   calls [`ManualScheduler::advance`].
//!
//! # Integration
//!
//! ```ignore
//! let mut handle = scheduler.after(Duration::from_secs(30), Box::new(move || {
//!     // runs once, on the scheduler's own thread/task
//! }));
//! // later, if the work is no longer wanted:
//! handle.cancel();
//! ```

mod manual;
mod runtime;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

use std::fmt;
use std::time::{Duration, Instant};

/// Work to run once when a timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after a delay.
///
/// Implementations must never run a task from inside `after` itself, even
/// for a zero delay: the caller may be holding a lock the task needs.
pub trait Scheduler: Send + Sync + 'static {
    /// Schedules `task` to run once after `delay`.
    fn after(&self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// The scheduler's notion of "now". Virtual for [`ManualScheduler`].
    fn now(&self) -> Instant;
}

// ---------------------------------------------------------------------------
// TimerHandle
// ---------------------------------------------------------------------------

/// Cancels a scheduled timer.
///
/// Dropping a handle does **not** cancel the timer; call
/// [`TimerHandle::cancel`] explicitly.
#[derive(Default)]
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    /// Wraps the function that cancels this timer.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle that cancels nothing.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Cancels the timer. Safe to call more than once, and after it fired.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// `true` until [`cancel`](Self::cancel) has been called.
    pub fn is_armed(&self) -> bool {
        self.cancel.is_some()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.is_armed())
            .finish()
    }
}
