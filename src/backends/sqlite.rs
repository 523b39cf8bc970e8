//! SQLite driver
//!
//! Built on rusqlite. Placeholders may be named (`@name`, `:name`, `$name`,
//! matched case-insensitively against the bound names) or positional (`?`,
//! `?NNN`, taking bindings in set order). Bindings that no placeholder uses
//! are ignored.
//!
//! Command timeouts are enforced with a progress handler that interrupts the
//! statement once the deadline passes; the interrupt surfaces as
//! [`DatabaseError::Timeout`].

use crate::core::{
    driver::{Driver, NativeCommand, NativeConnection, NativeCursor},
    error::{DatabaseError, Result},
    parameter::{normalize_name, ParameterSet},
    value::DatabaseValue,
};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, Rows, Statement};
use std::time::{Duration, Instant};

const DRIVER_NAME: &str = "sqlite";

/// Virtual machine instructions between two deadline checks
const PROGRESS_CHECK_OPS: i32 = 1000;

/// Connection string keys naming the database file
const PATH_KEYS: &[&str] = &["data source", "datasource", "filename", "database"];

/// Driver for SQLite connection strings
///
/// Accepts a bare path (or `:memory:`) and the `Data Source=app.db;Version=3;`
/// key/value form.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn open(&self, connection_string: &str) -> Result<Box<dyn NativeConnection>> {
        Ok(Box::new(SqliteConnection::open(connection_string)?))
    }
}

/// Native SQLite connection
pub struct SqliteConnection {
    conn: Option<Connection>,
}

impl SqliteConnection {
    /// Open the database named by `connection_string`
    ///
    /// Foreign key enforcement is switched on.
    pub fn open(connection_string: &str) -> Result<Self> {
        let path = database_path(connection_string)?;
        let conn = Connection::open(&path).map_err(|e| {
            DatabaseError::connection_with_source(format!("cannot open sqlite database '{}'", path), e)
        })?;
        conn.execute_batch("PRAGMA foreign_keys = ON").map_err(|e| {
            DatabaseError::connection_with_source("cannot enable foreign keys", e)
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an open rusqlite connection
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    /// Unwrap the rusqlite connection, `None` once closed
    pub fn into_inner(self) -> Option<Connection> {
        self.conn
    }

    fn connection(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DatabaseError::invalid_operation("sqlite connection is closed"))
    }
}

fn database_path(connection_string: &str) -> Result<String> {
    let trimmed = connection_string.trim();
    if !trimmed.contains('=') {
        return if trimmed.is_empty() {
            Err(DatabaseError::connection("empty sqlite connection string"))
        } else {
            Ok(trimmed.to_string())
        };
    }
    trimmed
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| PATH_KEYS.contains(&key.trim().to_lowercase().as_str()))
        .map(|(_, value)| value.trim().to_string())
        .filter(|path| !path.is_empty())
        .ok_or_else(|| {
            DatabaseError::connection(format!(
                "sqlite connection string has no data source: '{}'",
                connection_string
            ))
        })
}

impl NativeConnection for SqliteConnection {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn NativeCommand + 'c>> {
        let this: &'c Self = self;
        let conn = this.connection()?;
        let statement = conn.prepare(sql)?;
        let placeholders = (1..=statement.parameter_count())
            .map(|index| match statement.parameter_name(index) {
                Some(name) if !name.starts_with('?') => Placeholder::Named(normalize_name(name)),
                _ => Placeholder::Positional(index),
            })
            .collect();
        Ok(Box::new(SqliteCommand {
            conn,
            statement,
            placeholders,
        }))
    }

    fn begin(&mut self) -> Result<()> {
        self.connection()?.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.connection()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.connection()?.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.conn
            .as_ref()
            .map(|conn| !conn.is_autocommit())
            .unwrap_or(false)
    }

    fn close(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| {
                DatabaseError::connection_with_source("failed to close sqlite connection", e)
            }),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}

enum Placeholder {
    /// Normalized name
    Named(String),
    /// 1-based position
    Positional(usize),
}

struct SqliteCommand<'c> {
    conn: &'c Connection,
    statement: Statement<'c>,
    placeholders: Vec<Placeholder>,
}

impl SqliteCommand<'_> {
    fn bind(&mut self, parameters: &ParameterSet) -> Result<()> {
        for (offset, placeholder) in self.placeholders.iter().enumerate() {
            let parameter = match placeholder {
                Placeholder::Named(name) => parameters.get(name).ok_or_else(|| {
                    DatabaseError::binding(format!("no value bound for placeholder '{}'", name))
                })?,
                Placeholder::Positional(index) => {
                    parameters.iter().nth(index - 1).ok_or_else(|| {
                        DatabaseError::binding(format!(
                            "no value bound for positional placeholder {} ({} bound)",
                            index,
                            parameters.len()
                        ))
                    })?
                }
            };
            bind_value(&mut self.statement, offset + 1, &parameter.value).map_err(|e| {
                DatabaseError::binding(format!("cannot bind '{}': {}", parameter.name, e))
            })?;
        }
        Ok(())
    }
}

fn bind_value(
    statement: &mut Statement<'_>,
    index: usize,
    value: &DatabaseValue,
) -> rusqlite::Result<()> {
    match value {
        DatabaseValue::Null => statement.raw_bind_parameter(index, rusqlite::types::Null),
        DatabaseValue::Bool(v) => statement.raw_bind_parameter(index, v),
        DatabaseValue::Int(v) => statement.raw_bind_parameter(index, v),
        DatabaseValue::Long(v) => statement.raw_bind_parameter(index, v),
        DatabaseValue::Float(v) => statement.raw_bind_parameter(index, f64::from(*v)),
        DatabaseValue::Double(v) => statement.raw_bind_parameter(index, v),
        DatabaseValue::String(v) => statement.raw_bind_parameter(index, v.as_str()),
        DatabaseValue::Bytes(v) => statement.raw_bind_parameter(index, v.as_slice()),
        DatabaseValue::Guid(v) => statement.raw_bind_parameter(index, v),
        DatabaseValue::DateTime(v) => statement.raw_bind_parameter(index, v),
    }
}

fn arm_deadline(conn: &Connection, timeout: Option<Duration>) {
    if let Some(timeout) = timeout {
        let deadline = Instant::now() + timeout;
        conn.progress_handler(PROGRESS_CHECK_OPS, Some(move || Instant::now() >= deadline));
    }
}

fn disarm_deadline(conn: &Connection, timeout: Option<Duration>) {
    if timeout.is_some() {
        conn.progress_handler(0, None::<fn() -> bool>);
    }
}

fn map_error(err: rusqlite::Error, timeout: Option<Duration>) -> DatabaseError {
    match (err.sqlite_error_code(), timeout) {
        (Some(ErrorCode::OperationInterrupted), Some(timeout)) => {
            DatabaseError::timeout(timeout.as_millis() as u64)
        }
        _ => DatabaseError::Sqlite(err),
    }
}

impl NativeCommand for SqliteCommand<'_> {
    fn execute(&mut self, parameters: &ParameterSet, timeout: Option<Duration>) -> Result<u64> {
        self.bind(parameters)?;
        arm_deadline(self.conn, timeout);
        let result = run_to_completion(&mut self.statement);
        disarm_deadline(self.conn, timeout);
        result.map_err(|e| map_error(e, timeout))?;
        Ok(self.conn.changes() as u64)
    }

    fn query<'s>(
        &'s mut self,
        parameters: &ParameterSet,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn NativeCursor + 's>> {
        self.bind(parameters)?;
        let columns = self
            .statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        arm_deadline(self.conn, timeout);
        let mut cursor = SqliteCursor {
            conn: self.conn,
            rows: self.statement.raw_query(),
            columns,
            timeout,
            first: None,
        };
        // the statement runs now, not on the first read
        cursor.first = cursor.fetch()?;
        Ok(Box::new(cursor))
    }
}

/// Step a statement through all of its rows, discarding them
fn run_to_completion(statement: &mut Statement<'_>) -> rusqlite::Result<()> {
    let mut rows = statement.raw_query();
    while rows.next()?.is_some() {}
    Ok(())
}

struct SqliteCursor<'s> {
    conn: &'s Connection,
    rows: Rows<'s>,
    columns: Vec<String>,
    timeout: Option<Duration>,
    /// Row stepped when the query started
    first: Option<Vec<DatabaseValue>>,
}

impl SqliteCursor<'_> {
    fn fetch(&mut self) -> Result<Option<Vec<DatabaseValue>>> {
        let timeout = self.timeout;
        let width = self.columns.len();
        match self.rows.next().map_err(|e| map_error(e, timeout))? {
            Some(row) => {
                let mut values = Vec::with_capacity(width);
                for index in 0..width {
                    values.push(column_value(row.get_ref(index)?));
                }
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }
}

impl NativeCursor for SqliteCursor<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<DatabaseValue>>> {
        match self.first.take() {
            Some(row) => Ok(Some(row)),
            None => self.fetch(),
        }
    }
}

impl Drop for SqliteCursor<'_> {
    fn drop(&mut self) {
        disarm_deadline(self.conn, self.timeout);
    }
}

fn column_value(value: ValueRef<'_>) -> DatabaseValue {
    match value {
        ValueRef::Null => DatabaseValue::Null,
        ValueRef::Integer(v) => DatabaseValue::Long(v),
        ValueRef::Real(v) => DatabaseValue::Double(v),
        ValueRef::Text(v) => match std::str::from_utf8(v) {
            Ok(text) => DatabaseValue::String(text.to_string()),
            Err(_) => DatabaseValue::Bytes(v.to_vec()),
        },
        ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn memory() -> SqliteConnection {
        SqliteConnection::open(":memory:").unwrap()
    }

    fn query_all(
        conn: &mut SqliteConnection,
        sql: &str,
        parameters: &ParameterSet,
    ) -> Result<Vec<Vec<DatabaseValue>>> {
        let mut command = conn.prepare(sql)?;
        let mut cursor = command.query(parameters, None)?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    #[test]
    fn test_database_path_forms() {
        assert_eq!(database_path(":memory:").unwrap(), ":memory:");
        assert_eq!(
            database_path("Data Source=app.db;Version=3;").unwrap(),
            "app.db"
        );
        assert_eq!(database_path("filename = x.sqlite").unwrap(), "x.sqlite");
        assert_eq!(
            database_path("Version=3").unwrap_err().kind(),
            ErrorKind::Connection
        );
    }

    #[test]
    fn test_named_placeholders_any_prefix() {
        let mut conn = memory();
        let mut parameters = ParameterSet::new();
        parameters.bind("A", &1).unwrap();
        parameters.bind("@b", "two").unwrap();
        parameters.bind("unused", &0).unwrap();

        let rows = query_all(&mut conn, "SELECT :a, $B", &parameters).unwrap();
        assert_eq!(
            rows,
            vec![vec![DatabaseValue::Long(1), DatabaseValue::from("two")]]
        );
    }

    #[test]
    fn test_missing_named_binding() {
        let mut conn = memory();
        let err = query_all(&mut conn, "SELECT @missing", &ParameterSet::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Binding);
    }

    #[test]
    fn test_positional_placeholders() {
        let mut conn = memory();
        let mut parameters = ParameterSet::new();
        parameters.bind("first", &10).unwrap();
        parameters.bind("second", &20).unwrap();

        let rows = query_all(&mut conn, "SELECT ?, ?", &parameters).unwrap();
        assert_eq!(rows[0], vec![DatabaseValue::Long(10), DatabaseValue::Long(20)]);

        let rows = query_all(&mut conn, "SELECT ?2", &parameters).unwrap();
        assert_eq!(rows[0], vec![DatabaseValue::Long(20)]);
    }

    #[test]
    fn test_transaction_state_follows_autocommit() {
        let mut conn = memory();
        assert!(!conn.in_transaction());
        conn.begin().unwrap();
        assert!(conn.in_transaction());
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_timeout_interrupts_statement() {
        let mut conn = memory();
        let mut command = conn
            .prepare("WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c")
            .unwrap();
        let started = Instant::now();
        let err = match command.query(&ParameterSet::new(), Some(Duration::from_millis(50))) {
            Ok(_) => panic!("endless query should time out"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_utf8_text_stays_bytes() {
        let mut conn = memory();
        let rows = query_all(
            &mut conn,
            "SELECT CAST(x'ff41' AS TEXT), CAST(x'c3a9' AS TEXT)",
            &ParameterSet::new(),
        )
        .unwrap();
        assert_eq!(
            rows[0],
            vec![
                DatabaseValue::Bytes(vec![0xff, 0x41]),
                DatabaseValue::from("\u{e9}"),
            ]
        );
        assert!(rows[0][0].convert::<String>("t").is_err());
    }

    #[test]
    fn test_query_executes_before_first_read() {
        let mut conn = memory();
        conn.prepare("CREATE TABLE t (id INTEGER)")
            .unwrap()
            .execute(&ParameterSet::new(), None)
            .unwrap();
        {
            let mut insert = conn.prepare("INSERT INTO t VALUES (1)").unwrap();
            let cursor = insert.query(&ParameterSet::new(), None).unwrap();
            drop(cursor);
        }
        let rows = query_all(&mut conn, "SELECT count(*) FROM t", &ParameterSet::new()).unwrap();
        assert_eq!(rows[0], vec![DatabaseValue::Long(1)]);
    }

    #[test]
    fn test_execute_accepts_statements_returning_rows() {
        let mut conn = memory();
        let mut pragma = conn.prepare("PRAGMA journal_mode = MEMORY").unwrap();
        assert!(pragma.execute(&ParameterSet::new(), None).is_ok());
        drop(pragma);

        conn.prepare("CREATE TABLE t (id INTEGER)")
            .unwrap()
            .execute(&ParameterSet::new(), None)
            .unwrap();
        let mut insert = conn
            .prepare("INSERT INTO t VALUES (1), (2) RETURNING id")
            .unwrap();
        assert_eq!(insert.execute(&ParameterSet::new(), None).unwrap(), 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut conn = memory();
        conn.close().unwrap();
        assert!(conn.is_closed());
        conn.close().unwrap();
        assert_eq!(conn.begin().unwrap_err().kind(), ErrorKind::InvalidOperation);
    }
}
