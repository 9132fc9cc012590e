//! Scheduled sweeps never keep their store alive.
//!
//! A store dropped while monitored must be noticed on the next tick: the
//! task cancels itself, bumps the process-wide counter and sweeps nothing.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use metakv::gc::self_destruct_count;
use metakv::{
    Database, GcSchedule, KeyValueStore, ListFilter, ManualScheduler, Store, StoreOptions, Value,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn everything() -> ListFilter {
    ListFilter::new().with_include_expired(true)
}

fn expire_now(store: &Store, key: &str) {
    store.put(key, Value::from(1), None).unwrap();
    store.expire(key, Duration::from_millis(1), None).unwrap();
}

#[test]
fn test_dropped_store_self_destructs_without_sweeping() {
    let db = Database::in_memory().unwrap();
    let scheduler = Arc::new(ManualScheduler::new());
    let store = Store::open(&db, StoreOptions::default())
        .unwrap()
        .with_scheduler(scheduler.clone());
    // A second store on the same table observes the rows independently.
    let observer = Store::open(&db, StoreOptions::default()).unwrap();

    store.monitor(&GcSchedule::parse("* * * * *").unwrap()).unwrap();
    expire_now(&store, "a");
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(scheduler.fire(), 1);
    assert_eq!(observer.count(&everything(), None).unwrap(), 0);

    expire_now(&store, "b");
    std::thread::sleep(Duration::from_millis(5));
    let before = self_destruct_count();
    drop(store);

    assert_eq!(scheduler.fire(), 1);
    assert!(self_destruct_count() > before);
    assert_eq!(scheduler.active(), 0);
    // Nothing was swept on the self-destructing tick.
    assert_eq!(observer.count(&everything(), None).unwrap(), 1);

    // No further ticks run for the cancelled task.
    assert_eq!(scheduler.fire(), 0);
}

#[test]
fn test_clones_keep_the_task_alive() {
    let db = Database::in_memory().unwrap();
    let scheduler = Arc::new(ManualScheduler::new());
    let store = Store::open(&db, StoreOptions::default())
        .unwrap()
        .with_scheduler(scheduler.clone());
    store
        .monitor(&GcSchedule::every(Duration::from_secs(60)))
        .unwrap();

    let clone = store.clone();
    drop(store);
    scheduler.fire();
    assert_eq!(scheduler.active(), 1);
    assert!(clone.is_monitoring());

    drop(clone);
    scheduler.fire();
    assert_eq!(scheduler.active(), 0);
}

#[test]
fn test_prefix_view_keeps_store_alive() {
    let db = Database::in_memory().unwrap();
    let scheduler = Arc::new(ManualScheduler::new());
    let store = Store::open(&db, StoreOptions::default())
        .unwrap()
        .with_scheduler(scheduler.clone());
    let view = store.prefix("p:");
    view.monitor(&GcSchedule::every(Duration::from_secs(60)))
        .unwrap();

    drop(store);
    scheduler.fire();
    assert_eq!(scheduler.active(), 1);

    drop(view);
    scheduler.fire();
    assert_eq!(scheduler.active(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timer_sweeps_then_self_destructs() {
    let db = Database::in_memory().unwrap();
    let store = Store::open(&db, StoreOptions::default()).unwrap();
    let observer = Store::open(&db, StoreOptions::default()).unwrap();

    store
        .monitor(&GcSchedule::every(Duration::from_millis(20)))
        .unwrap();
    expire_now(&store, "a");

    let deadline = Instant::now() + Duration::from_secs(5);
    while observer.count(&everything(), None).unwrap() > 0 {
        assert!(Instant::now() < deadline, "timer never swept");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let before = self_destruct_count();
    drop(store);
    // Several ticks: at most one may still hold the store when it is dropped.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(self_destruct_count() > before);

    // The cancelled timer leaves later expired rows alone.
    expire_now(&observer, "b");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(observer.count(&everything(), None).unwrap(), 1);
}

#[tokio::test]
async fn test_replacing_schedule_cancels_previous_timer() {
    let db = Database::in_memory().unwrap();
    let store = Store::open(&db, StoreOptions::default()).unwrap();

    store
        .monitor(&GcSchedule::every(Duration::from_secs(3600)))
        .unwrap();
    store
        .monitor(&GcSchedule::every(Duration::from_millis(10)))
        .unwrap();
    assert!(store.is_monitoring());

    expire_now(&store, "a");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.count(&everything(), None).unwrap(), 0);

    assert!(store.stop_monitoring());
    assert!(!store.is_monitoring());
}
