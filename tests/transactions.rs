//! Transaction semantics across stores and views.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use metakv::{Database, Error, KeyValueStore, ListFilter, Store, StoreOptions, Value};
use serde_json::json;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn store_on(db: &Database, table: &str) -> Store {
    Store::open(db, StoreOptions::default().with_table_name(table)).unwrap()
}

#[test]
fn test_aborted_put_is_not_observable() {
    let db = Database::in_memory().unwrap();
    let store = store_on(&db, "kv");

    let result: metakv::Result<()> = db.transaction(|tx| {
        store.put("k", Value::from(1), Some(tx))?;
        store.put("j", Value::from(2), Some(tx))?;
        Err(Error::InvalidInput("abort".to_string()))
    });

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(!store.has("k", None).unwrap());
    assert!(!store.has("j", None).unwrap());
}

#[test]
fn test_committed_work_is_visible() {
    let db = Database::in_memory().unwrap();
    let store = store_on(&db, "kv");

    let count = db
        .transaction(|tx| {
            store.put("a", Value::from(1), Some(tx))?;
            store.expire("a", Duration::from_secs(60), Some(tx))?;
            store.assign("b", Value::from(json!({"x": 1})), Some(tx))?;
            store.assign("b", Value::from(json!({"y": 2})), Some(tx))?;
            store.count(&ListFilter::new(), Some(tx))
        })
        .unwrap();

    assert_eq!(count, 2);
    assert!(store.ttl("a", None).unwrap().is_some());
    assert_eq!(
        store.get("b", None).unwrap(),
        Value::from(json!({"x": 1, "y": 2}))
    );
}

#[test]
fn test_one_transaction_spans_tables() {
    let db = Database::in_memory().unwrap();
    let left = store_on(&db, "left_kv");
    let right = store_on(&db, "right_kv");

    let result: metakv::Result<()> = db.transaction(|tx| {
        left.put("k", Value::from("l"), Some(tx))?;
        right.put("k", Value::from("r"), Some(tx))?;
        Err(Error::InvalidInput("abort".to_string()))
    });
    assert!(result.is_err());
    assert!(!left.has("k", None).unwrap());
    assert!(!right.has("k", None).unwrap());

    db.transaction(|tx| {
        left.put("k", Value::from("l"), Some(tx))?;
        right.put("k", Value::from("r"), Some(tx))
    })
    .unwrap();
    assert_eq!(left.get("k", None).unwrap(), Value::from("l"));
    assert_eq!(right.get("k", None).unwrap(), Value::from("r"));
}

#[test]
fn test_foreign_transaction_is_rejected() {
    let db_a = Database::in_memory().unwrap();
    let db_b = Database::in_memory().unwrap();
    let store_b = store_on(&db_b, "kv");

    let result = db_a.transaction(|tx| store_b.put("k", Value::from(1), Some(tx)));
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(!store_b.has("k", None).unwrap());
}

#[test]
fn test_store_transaction_helper_rolls_back_gc() {
    let db = Database::in_memory().unwrap();
    let store = store_on(&db, "kv");
    store.put("old", Value::from(1), None).unwrap();
    store.expire("old", Duration::from_millis(1), None).unwrap();
    std::thread::sleep(Duration::from_millis(10));

    let result: metakv::Result<()> = store.transaction(|tx| {
        assert_eq!(store.gc(Some(tx))?, 1);
        Err(Error::InvalidInput("abort".to_string()))
    });
    assert!(result.is_err());

    let everything = ListFilter::new().with_include_expired(true);
    assert_eq!(store.count(&everything, None).unwrap(), 1);
}

#[test]
fn test_engine_errors_pass_through() {
    let db = Database::in_memory().unwrap();
    let store = store_on(&db, "kv");

    let result: metakv::Result<()> = store.transaction(|tx| {
        store.put("k", Value::from(1), Some(tx))?;
        Err(Error::Database(rusqlite::Error::InvalidQuery))
    });
    assert!(matches!(
        result,
        Err(Error::Database(rusqlite::Error::InvalidQuery))
    ));
    assert!(!store.has("k", None).unwrap());
}

#[test]
fn test_autocommit_waits_for_long_transaction() {
    let db = Database::in_memory().unwrap();
    let store = store_on(&db, "kv");
    store.put("a", Value::from(1), None).unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let writer = {
        let store = store.clone();
        thread::spawn(move || {
            store
                .transaction(|tx| {
                    store.put("b", Value::from(2), Some(tx))?;
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .unwrap();
        })
    };

    started_rx.recv().unwrap();
    let started = Instant::now();
    // Blocks until the transaction commits, then sees its write.
    assert!(store.has("a", None).unwrap());
    assert!(store.has("b", None).unwrap());
    assert!(started.elapsed() >= Duration::from_millis(100));
    writer.join().unwrap();
}

#[test]
fn test_missing_handle_inside_transaction_is_an_error() {
    let db = Database::in_memory().unwrap();
    let store = store_on(&db, "kv");

    let result = store.transaction(|_tx| store.has("a", None));
    assert!(matches!(
        result,
        Err(Error::OperationFailed { ref operation, .. }) if operation == "acquire_lock"
    ));

    // The lock is released afterwards.
    store.put("a", Value::from(1), None).unwrap();
    assert!(store.has("a", None).unwrap());
}
