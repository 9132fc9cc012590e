//! `SQLite` implementation of [`Table`].

use super::connection::{configure_connection, lock_connection};
use super::sql::{limit_clause, quote_identifier, render_predicate, validate_identifier};
use crate::storage::traits::{EXPIRES_COLUMN, ExtraColumns, KEY_COLUMN, VALUE_COLUMN};
use crate::storage::{Predicate, Row, Table};
use crate::{Error, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Source of unique database ids for transaction ownership checks.
static NEXT_DATABASE_ID: AtomicU64 = AtomicU64::new(1);

/// Column types accepted for extension columns.
const COLUMN_TYPES: [&str; 5] = ["TEXT", "INTEGER", "REAL", "BLOB", "NUMERIC"];

/// A shared `SQLite` connection.
///
/// Cloning is cheap; clones share the connection. Several tables (and so
/// several stores) can live in one database and take part in one transaction.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    id: u64,
    path: PathBuf,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_database_dir".to_string(),
                cause: e.to_string(),
            })?;
        }

        let conn = Connection::open(&path)?;
        Self::from_connection(conn, path)
    }

    /// Opens a private in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        configure_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            id: NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed),
            path,
        })
    }

    /// Returns the database path (`:memory:` for in-memory databases).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` inside a transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back when it
    /// returns `Err` (the error is passed through). Pass the handle to every
    /// store call made inside `f`.
    ///
    /// # Errors
    ///
    /// Returns the callback's error, or an engine error from begin or commit.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let conn = lock_connection(&self.conn, self.id)?;
        let tx = conn.unchecked_transaction()?;
        let output = {
            let handle = Transaction {
                conn: &tx,
                database_id: self.id,
            };
            f(&handle)?
        };
        tx.commit()?;
        Ok(output)
    }

    /// Creates a table handle, creating the table and its indexes if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is invalid or cannot be created.
    pub fn table(&self, schema: TableSchema) -> Result<SqliteTable> {
        SqliteTable::create(self.clone(), schema)
    }

    /// Runs `f` on the transaction's connection, or on the shared connection.
    fn with_conn<T>(
        &self,
        tx: Option<&Transaction<'_>>,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        match tx {
            Some(tx) => {
                if tx.database_id != self.id {
                    return Err(Error::InvalidInput(
                        "transaction belongs to a different database".to_string(),
                    ));
                }
                Ok(f(tx.conn)?)
            },
            None => {
                let conn = lock_connection(&self.conn, self.id)?;
                Ok(f(&conn)?)
            },
        }
    }
}

/// Handle to an open transaction.
///
/// Obtained from [`Database::transaction`]; only valid for tables of the
/// same database.
pub struct Transaction<'a> {
    conn: &'a Connection,
    database_id: u64,
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("database_id", &self.database_id)
            .finish_non_exhaustive()
    }
}

/// An extension column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// SQLite column type (`TEXT`, `INTEGER`, `REAL`, `BLOB` or `NUMERIC`).
    pub sql_type: String,
    /// Whether the column may hold NULL.
    pub nullable: bool,
}

impl ColumnDef {
    /// A nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    fn definition(&self) -> Result<String> {
        let sql_type = self.sql_type.to_ascii_uppercase();
        if !COLUMN_TYPES.contains(&sql_type.as_str()) {
            return Err(Error::InvalidInput(format!(
                "unsupported column type '{}' for column '{}'",
                self.sql_type, self.name
            )));
        }
        let null = if self.nullable { "" } else { " NOT NULL" };
        Ok(format!("{} {sql_type}{null}", quote_identifier(&self.name)?))
    }
}

/// An additional index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Indexed columns, each optionally followed by ` DESC`.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
}

impl IndexDef {
    /// A non-unique index over the given columns.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn column_list(&self) -> Result<(String, String)> {
        if self.columns.is_empty() {
            return Err(Error::InvalidInput("index without columns".to_string()));
        }
        let mut rendered = Vec::with_capacity(self.columns.len());
        let mut suffix = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let (name, desc) = column
                .strip_suffix(" DESC")
                .or_else(|| column.strip_suffix(" desc"))
                .map_or((column.as_str(), false), |name| (name, true));
            let quoted = quote_identifier(name)?;
            rendered.push(if desc { format!("{quoted} DESC") } else { quoted });
            suffix.push(name.to_string());
        }
        Ok((rendered.join(", "), suffix.join("_")))
    }
}

/// Table layout: the three fixed columns plus extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Extension columns.
    pub extra_columns: Vec<ColumnDef>,
    /// Indexes beyond the mandatory `expires DESC` index.
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    /// A schema with only the fixed columns.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra_columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        for column in &self.extra_columns {
            validate_identifier(&column.name)?;
            if [KEY_COLUMN, VALUE_COLUMN, EXPIRES_COLUMN].contains(&column.name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "column '{}' is reserved",
                    column.name
                )));
            }
        }
        Ok(())
    }

    /// DDL statements creating the table and its indexes.
    fn create_statements(&self) -> Result<Vec<String>> {
        self.validate()?;
        let table = quote_identifier(&self.name)?;

        let mut columns = vec![
            format!("{} TEXT PRIMARY KEY", quote_identifier(KEY_COLUMN)?),
            format!("{} TEXT NOT NULL", quote_identifier(VALUE_COLUMN)?),
            format!("{} INTEGER", quote_identifier(EXPIRES_COLUMN)?),
        ];
        for column in &self.extra_columns {
            columns.push(column.definition()?);
        }

        let mut statements = vec![
            format!("CREATE TABLE IF NOT EXISTS {table} ({})", columns.join(", ")),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table} ({} DESC)",
                quote_identifier(&format!("idx_{}_expires", self.name))?,
                quote_identifier(EXPIRES_COLUMN)?
            ),
        ];
        for index in &self.indexes {
            let (column_list, suffix) = index.column_list()?;
            let unique = if index.unique { "UNIQUE " } else { "" };
            statements.push(format!(
                "CREATE {unique}INDEX IF NOT EXISTS {} ON {table} ({column_list})",
                quote_identifier(&format!("idx_{}_{suffix}", self.name))?
            ));
        }
        Ok(statements)
    }

    /// Quoted column names in select order.
    fn select_list(&self) -> Result<String> {
        let mut names = vec![
            quote_identifier(KEY_COLUMN)?,
            quote_identifier(VALUE_COLUMN)?,
            quote_identifier(EXPIRES_COLUMN)?,
        ];
        for column in &self.extra_columns {
            names.push(quote_identifier(&column.name)?);
        }
        Ok(names.join(", "))
    }
}

/// A [`Table`] stored in a [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteTable {
    db: Database,
    schema: TableSchema,
    quoted_name: String,
    select_list: String,
}

impl SqliteTable {
    /// Creates the table (if missing) and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is invalid or DDL fails.
    pub fn create(db: Database, schema: TableSchema) -> Result<Self> {
        let statements = schema.create_statements()?;
        db.with_conn(None, |conn| {
            for statement in &statements {
                conn.execute(statement, [])?;
            }
            Ok(())
        })?;
        debug!(table = %schema.name, "Table ready");

        Ok(Self {
            quoted_name: quote_identifier(&schema.name)?,
            select_list: schema.select_list()?,
            db,
            schema,
        })
    }

    /// Returns the database holding this table.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the table schema.
    #[must_use]
    pub const fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn read_row(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
        let mut extra = ExtraColumns::new();
        for (offset, column) in self.schema.extra_columns.iter().enumerate() {
            extra.insert(column.name.clone(), row.get::<_, SqlValue>(3 + offset)?);
        }
        Ok(Row {
            key: row.get(0)?,
            value: row.get(1)?,
            expires: row.get(2)?,
            extra,
        })
    }

    fn check_extra_columns(&self, extra: &ExtraColumns) -> Result<()> {
        for name in extra.keys() {
            if !self.schema.extra_columns.iter().any(|c| &c.name == name) {
                return Err(Error::InvalidInput(format!(
                    "unknown column '{name}' for table '{}'",
                    self.schema.name
                )));
            }
        }
        Ok(())
    }
}

impl Table for SqliteTable {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn find_one(
        &self,
        predicate: &Predicate,
        tx: Option<&Transaction<'_>>,
    ) -> Result<Option<Row>> {
        let mut params = Vec::new();
        let condition = render_predicate(predicate, &mut params)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {condition} ORDER BY {} LIMIT 1",
            self.select_list,
            self.quoted_name,
            quote_identifier(KEY_COLUMN)?
        );
        self.db.with_conn(tx, |conn| {
            conn.query_row(&sql, params_from_iter(params.iter()), |row| {
                self.read_row(row)
            })
            .optional()
        })
    }

    fn find_all(
        &self,
        predicate: &Predicate,
        offset: Option<usize>,
        limit: Option<usize>,
        tx: Option<&Transaction<'_>>,
    ) -> Result<Vec<Row>> {
        let mut params = Vec::new();
        let condition = render_predicate(predicate, &mut params)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {condition} ORDER BY {}{}",
            self.select_list,
            self.quoted_name,
            quote_identifier(KEY_COLUMN)?,
            limit_clause(offset, limit)
        );
        self.db.with_conn(tx, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| self.read_row(row))?;
            rows.collect()
        })
    }

    fn update(
        &self,
        assignments: &[(&str, SqlValue)],
        predicate: &Predicate,
        tx: Option<&Transaction<'_>>,
    ) -> Result<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let mut params = Vec::with_capacity(assignments.len());
        let mut sets = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            params.push(value.clone());
            sets.push(format!("{} = ?{}", quote_identifier(column)?, params.len()));
        }
        let condition = render_predicate(predicate, &mut params)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {condition}",
            self.quoted_name,
            sets.join(", ")
        );
        self.db
            .with_conn(tx, |conn| conn.execute(&sql, params_from_iter(params.iter())))
    }

    fn upsert(&self, row: &Row, tx: Option<&Transaction<'_>>) -> Result<()> {
        self.check_extra_columns(&row.extra)?;

        let mut columns = vec![
            quote_identifier(KEY_COLUMN)?,
            quote_identifier(VALUE_COLUMN)?,
            quote_identifier(EXPIRES_COLUMN)?,
        ];
        let mut params = vec![
            SqlValue::Text(row.key.clone()),
            SqlValue::Text(row.value.clone()),
            row.expires.map_or(SqlValue::Null, SqlValue::Integer),
        ];
        for (name, value) in &row.extra {
            columns.push(quote_identifier(name)?);
            params.push(value.clone());
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            self.quoted_name,
            columns.join(", "),
            placeholders.join(", ")
        );
        self.db
            .with_conn(tx, |conn| conn.execute(&sql, params_from_iter(params.iter())))?;
        Ok(())
    }

    fn destroy(&self, predicate: &Predicate, tx: Option<&Transaction<'_>>) -> Result<usize> {
        let mut params = Vec::new();
        let condition = render_predicate(predicate, &mut params)?;
        let sql = format!("DELETE FROM {} WHERE {condition}", self.quoted_name);
        self.db
            .with_conn(tx, |conn| conn.execute(&sql, params_from_iter(params.iter())))
    }

    fn truncate(&self, tx: Option<&Transaction<'_>>) -> Result<()> {
        let sql = format!("DELETE FROM {}", self.quoted_name);
        self.db.with_conn(tx, |conn| conn.execute(&sql, []))?;
        Ok(())
    }

    fn count(&self, predicate: &Predicate, tx: Option<&Transaction<'_>>) -> Result<u64> {
        let mut params = Vec::new();
        let condition = render_predicate(predicate, &mut params)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {condition}",
            self.quoted_name
        );
        let count: i64 = self.db.with_conn(tx, |conn| {
            conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
        })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn transaction(&self, f: &mut dyn FnMut(&Transaction<'_>) -> Result<()>) -> Result<()> {
        self.db.transaction(|tx| f(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SqliteTable {
        let db = Database::in_memory().unwrap();
        db.table(TableSchema::new("kv")).unwrap()
    }

    #[test]
    fn test_upsert_and_find_one() {
        let table = table();
        table.upsert(&Row::new("a", "{}"), None).unwrap();

        let row = table.find_one(&Predicate::key_is("a"), None).unwrap();
        assert_eq!(row, Some(Row::new("a", "{}")));
        assert!(table.find_one(&Predicate::key_is("b"), None).unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces() {
        let table = table();
        let mut row = Row::new("a", "1");
        row.expires = Some(5);
        table.upsert(&row, None).unwrap();
        table.upsert(&Row::new("a", "2"), None).unwrap();

        let row = table
            .find_one(&Predicate::key_is("a"), None)
            .unwrap()
            .unwrap();
        assert_eq!(row.value, "2");
        assert_eq!(row.expires, None);
        assert_eq!(table.count(&Predicate::True, None).unwrap(), 1);
    }

    #[test]
    fn test_find_all_is_key_ordered() {
        let table = table();
        for key in ["c", "a", "b"] {
            table.upsert(&Row::new(key, "{}"), None).unwrap();
        }
        let keys: Vec<String> = table
            .find_all(&Predicate::True, None, None, None)
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        let page: Vec<String> = table
            .find_all(&Predicate::True, Some(1), Some(1), None)
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(page, vec!["b"]);
    }

    #[test]
    fn test_update_destroy_truncate() {
        let table = table();
        table.upsert(&Row::new("a", "{}"), None).unwrap();
        table.upsert(&Row::new("b", "{}"), None).unwrap();

        let changed = table
            .update(
                &[(EXPIRES_COLUMN, SqlValue::Integer(10))],
                &Predicate::key_is("a"),
                None,
            )
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            table.count(&Predicate::expired_at(10), None).unwrap(),
            1
        );

        assert_eq!(table.destroy(&Predicate::expired_at(10), None).unwrap(), 1);
        assert_eq!(table.count(&Predicate::True, None).unwrap(), 1);

        table.truncate(None).unwrap();
        assert_eq!(table.count(&Predicate::True, None).unwrap(), 0);
    }

    #[test]
    fn test_like_is_case_sensitive() {
        let table = table();
        table.upsert(&Row::new("Key-1", "{}"), None).unwrap();
        table.upsert(&Row::new("key-2", "{}"), None).unwrap();
        assert_eq!(
            table.count(&Predicate::like(KEY_COLUMN, "key-%"), None).unwrap(),
            1
        );
    }

    #[test]
    fn test_extension_columns() {
        let db = Database::in_memory().unwrap();
        let mut schema = TableSchema::new("settings");
        schema.extra_columns.push(ColumnDef::new("owner", "text"));
        schema.indexes.push(IndexDef::new(["owner"]));
        let table = db.table(schema).unwrap();

        let mut row = Row::new("a", "{}");
        row.extra
            .insert("owner".to_string(), SqlValue::Text("ada".to_string()));
        table.upsert(&row, None).unwrap();

        let found = table
            .find_one(&Predicate::eq("owner", "ada".to_string()), None)
            .unwrap()
            .unwrap();
        assert_eq!(found.extra.get("owner"), Some(&SqlValue::Text("ada".to_string())));

        let mut bad = Row::new("b", "{}");
        bad.extra.insert("nope".to_string(), SqlValue::Null);
        assert!(matches!(table.upsert(&bad, None), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_schema() {
        let db = Database::in_memory().unwrap();
        assert!(db.table(TableSchema::new("bad name")).is_err());

        let mut schema = TableSchema::new("t");
        schema.extra_columns.push(ColumnDef::new("expires", "INTEGER"));
        assert!(matches!(db.table(schema), Err(Error::InvalidInput(_))));

        let mut schema = TableSchema::new("t");
        schema.extra_columns.push(ColumnDef::new("x", "VARCHAR(3)"));
        assert!(matches!(db.table(schema), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let table = table();
        let db = table.database().clone();

        db.transaction(|tx| table.upsert(&Row::new("kept", "{}"), Some(tx)))
            .unwrap();

        let result: Result<()> = db.transaction(|tx| {
            table.upsert(&Row::new("dropped", "{}"), Some(tx))?;
            Err(Error::InvalidInput("abort".to_string()))
        });
        assert!(result.is_err());

        assert!(table.find_one(&Predicate::key_is("kept"), None).unwrap().is_some());
        assert!(table.find_one(&Predicate::key_is("dropped"), None).unwrap().is_none());
    }

    #[test]
    fn test_foreign_transaction_rejected() {
        let first = table();
        let second = table();
        let err = first
            .database()
            .transaction(|tx| second.upsert(&Row::new("a", "{}"), Some(tx)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("different database")));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kv.db");
        {
            let db = Database::open(&path).unwrap();
            let table = db.table(TableSchema::new("kv")).unwrap();
            table.upsert(&Row::new("a", "{}"), None).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.path(), path.as_path());
        let table = db.table(TableSchema::new("kv")).unwrap();
        assert_eq!(table.count(&Predicate::True, None).unwrap(), 1);
    }
}
