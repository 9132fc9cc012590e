//! Scheduled sweeping of expired rows.
//!
//! Reads never return expired rows, but the rows stay on disk until a sweep
//! deletes them. This module runs those sweeps on a schedule.
//!
//! # Overview
//!
//! - [`GcSchedule`]: when to sweep (cron expression or fixed interval)
//! - [`Scheduler`]: what fires the ticks ([`TokioScheduler`] in production,
//!   [`ManualScheduler`] in tests)
//! - [`GcTask`]: one registered sweep, holding only a weak reference to its target
//!
//! # Self-destruction
//!
//! A task never keeps its store alive. When a tick finds the store gone it
//! cancels its own registration and bumps [`self_destruct_count`], so a store
//! that was dropped without stopping its schedule does not leak a timer.
//!
//! # Example
//!
//! ```rust
//! use metakv::{Database, GcSchedule, KeyValueStore, ManualScheduler, Store, StoreOptions};
//! use std::sync::Arc;
//!
//! let scheduler = Arc::new(ManualScheduler::new());
//! let db = Database::in_memory()?;
//! let store = Store::open(&db, StoreOptions::default())?.with_scheduler(scheduler.clone());
//!
//! store.monitor(&GcSchedule::parse("*/5 * * * *")?)?;
//! assert_eq!(scheduler.fire(), 1);
//!
//! drop(store);
//! scheduler.fire();
//! assert_eq!(scheduler.active(), 0);
//! # Ok::<(), metakv::Error>(())
//! ```

mod schedule;
mod scheduler;
mod task;

pub use schedule::GcSchedule;
pub use scheduler::{ManualScheduler, ScheduleHandle, Scheduler, TickFn, TokioScheduler};
pub use task::{GcTask, Sweep, self_destruct_count};
