//! Expiring key-value store over a [`Table`].
//!
//! Every read path filters on `expires IS NULL OR expires > now`, so a row
//! disappears the instant its deadline passes whether or not a sweep has run.
//! Sweeps ([`KeyValueStore::gc`]) reclaim the physical rows.

use super::codec;
use super::sqlite::{acquire_lock, escape_like_literal, glob_to_like_pattern};
use super::traits::{EXPIRES_COLUMN, KEY_COLUMN};
use super::{
    ColumnDef, Database, ExtraColumns, IndexDef, KeyValueStore, Predicate, PrefixView, Row,
    SqlValue, Table, TableSchema, Transaction,
};
use crate::gc::{GcSchedule, GcTask, Scheduler, Sweep, TokioScheduler};
use crate::models::{Entry, ListFilter, Page, Value};
use crate::{Error, Result, current_timestamp_millis};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Table name used when none is configured.
pub const DEFAULT_TABLE_NAME: &str = "_metakv";

/// Options for [`Store::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Backing table name.
    pub table_name: String,
    /// Extension columns declared on the table.
    pub extra_columns: Vec<ColumnDef>,
    /// Extra indexes declared on the table.
    pub indexes: Vec<IndexDef>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            extra_columns: Vec::new(),
            indexes: Vec::new(),
        }
    }
}

impl StoreOptions {
    /// Sets the table name.
    #[must_use]
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Declares an extension column.
    #[must_use]
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.extra_columns.push(column);
        self
    }

    /// Declares an extra index.
    #[must_use]
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    fn into_schema(self) -> TableSchema {
        TableSchema {
            name: self.table_name,
            extra_columns: self.extra_columns,
            indexes: self.indexes,
        }
    }
}

/// Scheduler and active sweep task of a store.
#[derive(Default)]
struct GcState {
    scheduler: Option<Arc<dyn Scheduler>>,
    task: Option<GcTask>,
}

struct StoreInner {
    table: Arc<dyn Table>,
    gc: Mutex<GcState>,
}

impl Sweep for StoreInner {
    fn sweep(&self) -> Result<usize> {
        sweep_expired(self.table.as_ref(), None)
    }

    fn label(&self) -> &str {
        self.table.name()
    }
}

/// Deletes every expired row of `table`.
fn sweep_expired(table: &dyn Table, tx: Option<&Transaction<'_>>) -> Result<usize> {
    let start = Instant::now();
    let removed = table.destroy(&Predicate::expired_at(current_timestamp_millis()), tx)?;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    metrics::counter!("metakv_gc_sweeps_total", "table" => table.name().to_string()).increment(1);
    metrics::counter!("metakv_gc_rows_removed_total", "table" => table.name().to_string())
        .increment(removed as u64);
    metrics::histogram!("metakv_gc_duration_ms").record(duration_ms);

    if removed > 0 {
        info!(table = table.name(), rows_removed = removed, duration_ms, "Swept expired rows");
    } else {
        debug!(table = table.name(), duration_ms, "No expired rows to sweep");
    }
    Ok(removed)
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// An expiring key-value store.
///
/// Cloning is cheap and every clone shares the same table and sweep task.
/// The scheduled sweep only holds a weak reference: once the last clone is
/// dropped the task cancels itself on its next tick.
///
/// # Example
///
/// ```rust
/// use metakv::{Database, KeyValueStore, ListFilter, Store, StoreOptions, Value};
/// use std::time::Duration;
///
/// let db = Database::in_memory()?;
/// let store = Store::open(&db, StoreOptions::default())?;
///
/// store.put("a", Value::from(1), None)?;
/// store.expire("a", Duration::from_secs(60), None)?;
/// assert!(store.ttl("a", None)?.is_some());
/// assert_eq!(store.count(&ListFilter::new(), None)?, 1);
/// # Ok::<(), metakv::Error>(())
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("table", &self.inner.table.name())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}

impl Store {
    /// Opens a store on a table of `db`, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is invalid or cannot be created.
    pub fn open(db: &Database, options: StoreOptions) -> Result<Self> {
        let table = db.table(options.into_schema())?;
        Ok(Self::with_table(Arc::new(table)))
    }

    /// Wraps an existing table.
    #[must_use]
    pub fn with_table(table: Arc<dyn Table>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                table,
                gc: Mutex::new(GcState::default()),
            }),
        }
    }

    /// Sets the scheduler used by [`KeyValueStore::monitor`].
    ///
    /// Without one, `monitor` uses a [`TokioScheduler`] on the current runtime.
    #[must_use]
    pub fn with_scheduler(self, scheduler: Arc<dyn Scheduler>) -> Self {
        acquire_lock(&self.inner.gc).scheduler = Some(scheduler);
        self
    }

    /// Returns the backing table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.inner.table.name()
    }

    /// Returns the backing table.
    #[must_use]
    pub fn table(&self) -> &Arc<dyn Table> {
        &self.inner.table
    }

    /// Returns a view that prepends `prefix` to every key.
    #[must_use]
    pub fn prefix(&self, prefix: impl Into<String>) -> PrefixView {
        PrefixView::new(Arc::new(self.clone()), prefix)
    }

    /// Runs `f` inside a transaction of the backing table.
    ///
    /// Committed when `f` returns `Ok`, rolled back when it returns `Err`.
    /// Pass the handle to every store call made inside `f`.
    ///
    /// # Errors
    ///
    /// Returns the callback's error, or an engine error from begin or commit.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut f = Some(f);
        let mut output = None;
        self.inner.table.transaction(&mut |tx| {
            if let Some(f) = f.take() {
                output = Some(f(tx)?);
            }
            Ok(())
        })?;
        output.ok_or_else(|| Error::OperationFailed {
            operation: "transaction".to_string(),
            cause: "transaction callback did not run".to_string(),
        })
    }

    /// Returns `true` while a scheduled sweep is installed and not cancelled.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        acquire_lock(&self.inner.gc)
            .task
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    /// Cancels the scheduled sweep, if any; returns whether one was active.
    pub fn stop_monitoring(&self) -> bool {
        let task = acquire_lock(&self.inner.gc).task.take();
        task.is_some_and(|task| {
            let was_active = !task.is_cancelled();
            task.cancel();
            was_active
        })
    }

    /// Live-row predicate, optionally narrowed by key prefix, pattern and extra predicate.
    fn filter_predicate(filter: &ListFilter, now: i64) -> Predicate {
        let mut predicate = if filter.include_expired {
            Predicate::True
        } else {
            Predicate::live_at(now)
        };
        match (&filter.key_prefix, &filter.pattern) {
            (Some(prefix), pattern) => {
                // The prefix matches literally; the pattern keeps its wildcards, and a
                // backslash in it stays a plain character under ESCAPE.
                let rest = glob_to_like_pattern(pattern.as_deref().unwrap_or("*"))
                    .replace('\\', "\\\\");
                predicate = predicate.and(Predicate::like_escaped(
                    KEY_COLUMN,
                    format!("{}{rest}", escape_like_literal(prefix)),
                ));
            },
            (None, Some(pattern)) => {
                predicate =
                    predicate.and(Predicate::like(KEY_COLUMN, glob_to_like_pattern(pattern)));
            },
            (None, None) => {},
        }
        if let Some(extra) = &filter.extra {
            predicate = predicate.and(extra.clone());
        }
        predicate
    }

    fn live_key(key: &str) -> Predicate {
        Predicate::key_is(key).and(Predicate::live_at(current_timestamp_millis()))
    }

    fn assign_in(
        &self,
        key: &str,
        value: Value,
        extra: &ExtraColumns,
        tx: &Transaction<'_>,
    ) -> Result<()> {
        let merged = match self.get_optional(key, Some(tx))? {
            Some(existing) if existing.is_structured() => existing.merged_with(value),
            _ => value,
        };
        self.put_with(key, merged, extra, Some(tx))
    }
}

impl KeyValueStore for Store {
    #[instrument(skip(self, tx), name = "metakv.store.get", fields(table = self.table_name()))]
    fn get_optional(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<Option<Value>> {
        self.inner
            .table
            .find_one(&Self::live_key(key), tx)?
            .map(|row| codec::decode(&row.value))
            .transpose()
    }

    #[instrument(skip(self, tx), name = "metakv.store.has", fields(table = self.table_name()))]
    fn has(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool> {
        Ok(self.inner.table.count(&Self::live_key(key), tx)? > 0)
    }

    #[instrument(
        skip(self, value, extra, tx),
        name = "metakv.store.put", fields(table = self.table_name())
    )]
    fn put_with(
        &self,
        key: &str,
        value: Value,
        extra: &ExtraColumns,
        tx: Option<&Transaction<'_>>,
    ) -> Result<()> {
        let row = Row {
            key: key.to_string(),
            value: codec::encode(&value),
            expires: None,
            extra: extra.clone(),
        };
        self.inner.table.upsert(&row, tx)?;
        debug!(key, "Stored value");
        Ok(())
    }

    #[instrument(
        skip(self, value, extra, tx),
        name = "metakv.store.assign", fields(table = self.table_name())
    )]
    fn assign_with(
        &self,
        key: &str,
        value: Value,
        extra: &ExtraColumns,
        tx: Option<&Transaction<'_>>,
    ) -> Result<()> {
        if !value.is_structured() {
            return self.put_with(key, value, extra, tx);
        }
        match tx {
            Some(tx) => self.assign_in(key, value, extra, tx),
            None => {
                let mut value = Some(value);
                self.inner.table.transaction(&mut |tx| {
                    let value = value.take().unwrap_or_default();
                    self.assign_in(key, value, extra, tx)
                })
            },
        }
    }

    #[instrument(skip(self, tx), name = "metakv.store.delete", fields(table = self.table_name()))]
    fn delete(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool> {
        let deleted = self.inner.table.destroy(&Self::live_key(key), tx)? > 0;
        debug!(key, deleted, "Deleted key");
        Ok(deleted)
    }

    #[instrument(skip(self, tx), name = "metakv.store.expire", fields(table = self.table_name()))]
    fn expire(&self, key: &str, ttl: Duration, tx: Option<&Transaction<'_>>) -> Result<()> {
        let now = current_timestamp_millis();
        let deadline = now.saturating_add(millis(ttl));
        let predicate = Predicate::key_is(key).and(Predicate::live_at(now));
        let changed = self.inner.table.update(
            &[(EXPIRES_COLUMN, SqlValue::Integer(deadline))],
            &predicate,
            tx,
        )?;
        if changed == 0 {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        debug!(key, deadline, "Set expiration");
        Ok(())
    }

    #[instrument(skip(self, tx), name = "metakv.store.ttl", fields(table = self.table_name()))]
    fn ttl(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<Option<Duration>> {
        let now = current_timestamp_millis();
        let predicate = Predicate::key_is(key).and(Predicate::live_at(now));
        let row = self
            .inner
            .table
            .find_one(&predicate, tx)?
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;
        Ok(row
            .expires
            .map(|expires| Duration::from_millis(expires.saturating_sub(now).max(0) as u64)))
    }

    #[instrument(skip(self, tx), name = "metakv.store.persist", fields(table = self.table_name()))]
    fn persist(&self, key: &str, tx: Option<&Transaction<'_>>) -> Result<bool> {
        let changed = self.inner.table.update(
            &[(EXPIRES_COLUMN, SqlValue::Null)],
            &Self::live_key(key),
            tx,
        )?;
        Ok(changed > 0)
    }

    #[instrument(skip(self, tx), name = "metakv.store.gc", fields(table = self.table_name()))]
    fn gc(&self, tx: Option<&Transaction<'_>>) -> Result<usize> {
        sweep_expired(self.inner.table.as_ref(), tx)
    }

    #[instrument(skip(self, tx), name = "metakv.store.clear", fields(table = self.table_name()))]
    fn clear(&self, tx: Option<&Transaction<'_>>) -> Result<()> {
        self.inner.table.truncate(tx)
    }

    #[instrument(skip(self, tx), name = "metakv.store.count", fields(table = self.table_name()))]
    fn count(&self, filter: &ListFilter, tx: Option<&Transaction<'_>>) -> Result<u64> {
        let predicate = Self::filter_predicate(filter, current_timestamp_millis());
        self.inner.table.count(&predicate, tx)
    }

    #[instrument(skip(self, tx), name = "metakv.store.all", fields(table = self.table_name()))]
    fn all(
        &self,
        filter: &ListFilter,
        page: Page,
        tx: Option<&Transaction<'_>>,
    ) -> Result<Vec<Entry>> {
        let predicate = Self::filter_predicate(filter, current_timestamp_millis());
        self.inner
            .table
            .find_all(&predicate, page.offset, page.limit, tx)?
            .into_iter()
            .map(|row| {
                let value = codec::decode(&row.value)?;
                Ok(Entry::new(row.key, value))
            })
            .collect()
    }

    #[instrument(skip(self), name = "metakv.store.monitor", fields(table = self.table_name()))]
    fn monitor(&self, schedule: &GcSchedule) -> Result<()> {
        let mut state = acquire_lock(&self.inner.gc);
        if let Some(previous) = state.task.take() {
            previous.cancel();
            debug!(schedule = %previous.schedule(), "Replaced previous sweep schedule");
        }

        let scheduler = match &state.scheduler {
            Some(scheduler) => Arc::clone(scheduler),
            None => {
                let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current()?);
                state.scheduler = Some(Arc::clone(&scheduler));
                scheduler
            },
        };

        let task = GcTask::spawn(Arc::downgrade(&self.inner), scheduler.as_ref(), schedule)?;
        info!(schedule = %schedule, "Scheduled expired-row sweeps");
        state.task = Some(task);
        Ok(())
    }
}
