//! Sweep tasks bound to a weakly-held target.

use super::{GcSchedule, ScheduleHandle, Scheduler, TickFn};
use crate::Result;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Tasks that have cancelled themselves because their target was dropped.
static SELF_DESTRUCTS: AtomicU64 = AtomicU64::new(0);

/// Number of sweep tasks, process-wide, that found their target dropped and
/// cancelled themselves.
///
/// Monotonic. Useful for asserting that dropped stores do not leave timers
/// behind.
#[must_use]
pub fn self_destruct_count() -> u64 {
    SELF_DESTRUCTS.load(Ordering::SeqCst)
}

/// Something a [`GcTask`] can sweep.
pub trait Sweep: Send + Sync {
    /// Deletes expired rows; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweep fails. The task logs it and keeps going.
    fn sweep(&self) -> Result<usize>;

    /// Name used in logs and metrics.
    fn label(&self) -> &str;
}

/// A registered sweep.
///
/// Holds only a [`Weak`] reference to its target, so the task never keeps a
/// store alive. Dropping a `GcTask` does not cancel it: the registration
/// lives until [`GcTask::cancel`] is called or a tick finds the target gone.
#[derive(Debug)]
pub struct GcTask {
    handle: ScheduleHandle,
    schedule: GcSchedule,
}

impl GcTask {
    /// Registers a sweep of `target` on `scheduler`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler refuses the registration.
    pub fn spawn<T: Sweep + 'static>(
        target: Weak<T>,
        scheduler: &dyn Scheduler,
        schedule: &GcSchedule,
    ) -> Result<Self> {
        let tick: TickFn = Arc::new(move || run_tick(&target));
        let handle = scheduler.schedule(schedule, tick)?;
        Ok(Self {
            handle,
            schedule: schedule.clone(),
        })
    }

    /// Cancels the registration.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Returns `true` once cancelled, either explicitly or by self-destruction.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// The schedule this task was registered with.
    #[must_use]
    pub const fn schedule(&self) -> &GcSchedule {
        &self.schedule
    }

    /// The registration's cancellation handle.
    #[must_use]
    pub const fn handle(&self) -> &ScheduleHandle {
        &self.handle
    }
}

/// One tick: sweep the target if it is still alive, otherwise stop.
fn run_tick<T: Sweep>(target: &Weak<T>) -> ControlFlow<()> {
    let Some(target) = target.upgrade() else {
        SELF_DESTRUCTS.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("metakv_gc_self_destruct_total").increment(1);
        warn!("Sweep target dropped, cancelling task");
        return ControlFlow::Break(());
    };

    match target.sweep() {
        Ok(removed) => {
            debug!(store = target.label(), removed, "Scheduled sweep finished");
        },
        Err(e) => {
            metrics::counter!("metakv_gc_tick_failures_total", "reason" => "error").increment(1);
            warn!(store = target.label(), error = %e, "Scheduled sweep failed");
        },
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::gc::ManualScheduler;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Target {
        sweeps: AtomicUsize,
        fail: bool,
    }

    impl Sweep for Target {
        fn sweep(&self) -> Result<usize> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::InvalidInput("broken".to_string()))
            } else {
                Ok(0)
            }
        }

        fn label(&self) -> &str {
            "target"
        }
    }

    fn schedule() -> GcSchedule {
        GcSchedule::every(Duration::from_secs(1))
    }

    #[test]
    fn test_sweeps_while_target_alive() {
        let scheduler = ManualScheduler::new();
        let target = Arc::new(Target::default());
        let task = GcTask::spawn(Arc::downgrade(&target), &scheduler, &schedule()).unwrap();

        scheduler.fire();
        scheduler.fire();
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 2);
        assert!(!task.is_cancelled());
    }

    #[test]
    fn test_self_destructs_when_target_dropped() {
        let scheduler = ManualScheduler::new();
        let target = Arc::new(Target::default());
        let task = GcTask::spawn(Arc::downgrade(&target), &scheduler, &schedule()).unwrap();
        let before = self_destruct_count();

        drop(target);
        assert_eq!(scheduler.fire(), 1);
        assert!(task.is_cancelled());
        assert!(self_destruct_count() > before);
        assert_eq!(scheduler.active(), 0);
    }

    #[test]
    fn test_failed_sweep_keeps_task() {
        let scheduler = ManualScheduler::new();
        let target = Arc::new(Target {
            fail: true,
            ..Target::default()
        });
        let task = GcTask::spawn(Arc::downgrade(&target), &scheduler, &schedule()).unwrap();

        scheduler.fire();
        scheduler.fire();
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 2);
        assert!(!task.is_cancelled());
    }

    #[test]
    fn test_dropping_task_does_not_cancel() {
        let scheduler = ManualScheduler::new();
        let target = Arc::new(Target::default());
        let task = GcTask::spawn(Arc::downgrade(&target), &scheduler, &schedule()).unwrap();
        let handle = task.handle().clone();

        drop(task);
        assert!(!handle.is_cancelled());
        assert_eq!(scheduler.fire(), 1);
        assert_eq!(target.sweeps.load(Ordering::SeqCst), 1);

        handle.cancel();
        assert_eq!(scheduler.fire(), 0);
    }
}
