//! Scheduler backed by the Tokio timer wheel.

use std::time::{Duration, Instant};

use tokio::runtime::{Handle, TryCurrentError};
use tracing::trace;

use crate::{Scheduler, TimerHandle, TimerTask};

/// A [`Scheduler`] that spawns one sleeping task per timer.
///
/// Tasks run on the captured runtime, so `after` may be called from any
/// thread. Cancelling aborts the sleeping task; a task that is already
/// running is left to finish.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns timers on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Creates a scheduler bound to the runtime of the calling context.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        trace!(delay_ms = delay.as_millis() as u64, "timer scheduled");
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }

    fn now(&self) -> Instant {
        // Follows Tokio's clock so paused-time tests see consistent values.
        tokio::time::Instant::now().into_std()
    }
}
