//! Shared connection handling for the `SQLite` table.
//!
//! Provides mutex acquisition with poison recovery, same-thread re-entry
//! detection, and the pragma setup every connection gets.

use crate::{Error, Result};
use rusqlite::Connection;
use std::cell::RefCell;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex lock, recovering the inner value if it was poisoned.
///
/// A panic in an earlier critical section leaves the connection itself
/// usable, so the guard is recovered and a warning logged.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

thread_local! {
    /// Ids of the connections this thread currently holds locked.
    static HELD_CONNECTIONS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// A held connection lock, registered as owned by the current thread.
pub struct ConnectionGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    id: u64,
}

impl<T> Deref for ConnectionGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for ConnectionGuard<'_, T> {
    fn drop(&mut self) {
        HELD_CONNECTIONS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&id| id == self.id) {
                held.swap_remove(pos);
            }
        });
    }
}

/// Locks the connection identified by `id`, blocking until it is free.
///
/// Other threads simply wait their turn. A thread that already holds the
/// lock (it called a store without the handle from inside its own
/// transaction) gets an error instead of deadlocking on itself.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the current thread already holds the lock.
pub fn lock_connection<T>(mutex: &Mutex<T>, id: u64) -> Result<ConnectionGuard<'_, T>> {
    if HELD_CONNECTIONS.with(|held| held.borrow().contains(&id)) {
        metrics::counter!("sqlite_lock_reentry_total").increment(1);
        return Err(Error::OperationFailed {
            operation: "acquire_lock".to_string(),
            cause: "connection is already locked by this thread; \
                    pass the transaction handle when calling from inside a transaction"
                .to_string(),
        });
    }

    let guard = acquire_lock(mutex);
    HELD_CONNECTIONS.with(|held| held.borrow_mut().push(id));
    Ok(ConnectionGuard { guard, id })
}

/// Configures a `SQLite` connection.
///
/// # Configuration Applied
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention
/// - **`case_sensitive_like`**: key patterns match case-sensitively
///
/// # Errors
///
/// Returns an error if the `case_sensitive_like` pragma cannot be applied.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row ("wal"/"memory"), so failures here are not fatal
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    conn.pragma_update(None, "case_sensitive_like", true)?;

    Ok(())
}
