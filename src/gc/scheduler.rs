//! Tick sources for scheduled sweeps.

use super::GcSchedule;
use crate::{Error, Result};
use std::ops::ControlFlow;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Callback run on every tick. Returning [`ControlFlow::Break`] cancels the registration.
pub type TickFn = Arc<dyn Fn() -> ControlFlow<()> + Send + Sync>;

/// Registers recurring ticks.
pub trait Scheduler: Send + Sync {
    /// Registers `tick` to run on `schedule` until the returned handle is cancelled
    /// or the tick returns [`ControlFlow::Break`].
    ///
    /// # Errors
    ///
    /// Returns an error if the registration cannot be made.
    fn schedule(&self, schedule: &GcSchedule, tick: TickFn) -> Result<ScheduleHandle>;
}

#[derive(Debug, Default)]
struct HandleState {
    cancelled: AtomicBool,
    wake: Notify,
}

/// Cancellation handle for one registration.
///
/// Clones share state. Dropping a handle does not cancel the registration.
#[derive(Debug, Clone, Default)]
pub struct ScheduleHandle {
    state: Arc<HandleState>,
}

impl ScheduleHandle {
    /// Creates an active handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the registration. Idempotent.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            self.state.wake.notify_waiters();
        }
    }

    /// Returns `true` once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once the handle is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let mut notified = pin!(self.state.wake.notified());
            // Registered before the flag check so a concurrent cancel is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Fires ticks from timer tasks on a Tokio runtime.
///
/// Each tick runs on the blocking pool so sweeps never stall the runtime's
/// worker threads.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Uses the given runtime.
    #[must_use]
    pub const fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Uses the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when called outside a Tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::OperationFailed {
                operation: "schedule_gc".to_string(),
                cause: format!(
                    "no Tokio runtime available ({e}); call from within a runtime \
                     or use Store::with_scheduler"
                ),
            })
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, schedule: &GcSchedule, tick: TickFn) -> Result<ScheduleHandle> {
        let handle = ScheduleHandle::new();
        self.runtime
            .spawn(run_timer(schedule.clone(), tick, handle.clone()));
        Ok(handle)
    }
}

async fn run_timer(schedule: GcSchedule, tick: TickFn, handle: ScheduleHandle) {
    loop {
        let Some(delay) = schedule.next_delay() else {
            debug!(schedule = %schedule, "Schedule has no further occurrences");
            break;
        };

        tokio::select! {
            () = tokio::time::sleep(delay) => {},
            () = handle.cancelled() => break,
        }
        if handle.is_cancelled() {
            break;
        }

        let tick = Arc::clone(&tick);
        match tokio::task::spawn_blocking(move || tick()).await {
            Ok(ControlFlow::Continue(())) => {},
            Ok(ControlFlow::Break(())) => {
                handle.cancel();
                break;
            },
            Err(e) => {
                metrics::counter!("metakv_gc_tick_failures_total", "reason" => "panic")
                    .increment(1);
                warn!(error = %e, schedule = %schedule, "Sweep tick panicked");
            },
        }
    }
    debug!(schedule = %schedule, "Timer task stopped");
}

struct Registration {
    tick: TickFn,
    handle: ScheduleHandle,
}

/// Scheduler whose ticks fire only when [`ManualScheduler::fire`] is called.
#[derive(Default)]
pub struct ManualScheduler {
    registrations: Mutex<Vec<Registration>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("active", &self.active())
            .finish()
    }
}

impl ManualScheduler {
    /// Creates a scheduler with no registrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every active registration once; returns how many ran.
    ///
    /// Registrations whose tick breaks, or whose handle was cancelled, are dropped.
    pub fn fire(&self) -> usize {
        let due: Vec<(TickFn, ScheduleHandle)> = self
            .lock()
            .iter()
            .filter(|r| !r.handle.is_cancelled())
            .map(|r| (Arc::clone(&r.tick), r.handle.clone()))
            .collect();

        for (tick, handle) in &due {
            if tick().is_break() {
                handle.cancel();
            }
        }

        self.lock().retain(|r| !r.handle.is_cancelled());
        due.len()
    }

    /// Number of registrations that are not cancelled.
    #[must_use]
    pub fn active(&self) -> usize {
        self.lock()
            .iter()
            .filter(|r| !r.handle.is_cancelled())
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, _schedule: &GcSchedule, tick: TickFn) -> Result<ScheduleHandle> {
        let handle = ScheduleHandle::new();
        self.lock().push(Registration {
            tick,
            handle: handle.clone(),
        });
        Ok(handle)
    }
}
