//! Command builder and result readers
//!
//! A [`CommandBuilder`] accumulates SQL text and parameter bindings and runs
//! them in one of the execution modes: [`as_non_query`], [`as_scalar`],
//! [`as_single`], [`as_reader`] or [`as_enumerable`].
//!
//! The native command is prepared on the first execution and kept, so a
//! builder can be re-executed with updated bindings:
//!
//! ```rust,no_run
//! # use rust_db_access::prelude::*;
//! # fn demo(conn: &mut Connection<'_>) -> Result<()> {
//! let mut insert = conn.sql("INSERT INTO t (id, name) VALUES (@id, @name)");
//! for (id, name) in [(1, "a"), (2, "b")] {
//!     insert.with_parameter("id", id).with_parameter("name", name);
//!     insert.as_non_query()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A builder borrows its connection mutably and a [`Reader`] borrows its
//! builder mutably, so a connection runs one command at a time and nothing
//! else can touch it while a reader is open.
//!
//! [`as_non_query`]: CommandBuilder::as_non_query
//! [`as_scalar`]: CommandBuilder::as_scalar
//! [`as_single`]: CommandBuilder::as_single
//! [`as_reader`]: CommandBuilder::as_reader
//! [`as_enumerable`]: CommandBuilder::as_enumerable

use super::driver::{NativeCommand, NativeConnection, NativeCursor};
use super::error::{fingerprint, CommandContext, DatabaseError, Result};
use super::parameter::{normalize_name, ParameterDirection, ParameterSet, ToParameters};
use super::row::{Columns, FromRow, RowView};
use super::value::{DatabaseValue, FromValue, ToValue};
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Mapper used by [`CommandBuilder::as_records`]
pub type RecordMapper<T> = fn(&RowView<'_>) -> Result<T>;

enum CommandState<'c> {
    /// Not executed yet
    Ready(&'c mut dyn NativeConnection),
    /// Prepared, re-executable
    Prepared(Box<dyn NativeCommand + 'c>),
    /// Created from a closed connection
    Closed,
    /// Preparation failed
    Failed,
}

/// Fluent builder for one SQL command
pub struct CommandBuilder<'c> {
    state: CommandState<'c>,
    sql: String,
    parameters: ParameterSet,
    deferred: Option<DatabaseError>,
    /// Bindings whose latest update failed; `None` stands for a record
    unresolved: Vec<Option<String>>,
    timeout: Option<Duration>,
    default_timeout: Option<Duration>,
    driver: String,
    output_capable: bool,
}

impl<'c> CommandBuilder<'c> {
    pub(crate) fn new(
        native: &'c mut dyn NativeConnection,
        sql: impl Into<String>,
        default_timeout: Option<Duration>,
    ) -> Self {
        let driver = native.driver_name().to_string();
        let output_capable = native.supports_output_parameters();
        let mut command =
            Self::with_state(CommandState::Ready(native), sql.into(), default_timeout);
        command.driver = driver;
        command.output_capable = output_capable;
        command
    }

    pub(crate) fn closed(sql: impl Into<String>) -> Self {
        Self::with_state(CommandState::Closed, sql.into(), None)
    }

    fn with_state(state: CommandState<'c>, sql: String, default_timeout: Option<Duration>) -> Self {
        Self {
            state,
            sql,
            parameters: ParameterSet::new(),
            deferred: None,
            unresolved: Vec::new(),
            timeout: None,
            default_timeout,
            driver: String::new(),
            output_capable: false,
        }
    }

    /// SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Current bindings
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Bind `value` to `name`, overwriting an earlier binding of that name
    ///
    /// A binding failure is reported by the next execution, and every
    /// execution after it fails until `name` is bound successfully.
    pub fn with_parameter<V: ToValue>(&mut self, name: &str, value: V) -> &mut Self {
        let outcome = self.parameters.bind(name, &value).map(|_| ());
        self.settle(Some(normalize_name(name)), outcome);
        self
    }

    /// Bind with an explicit direction
    pub fn with_parameter_direction<V: ToValue>(
        &mut self,
        name: &str,
        value: V,
        direction: ParameterDirection,
    ) -> &mut Self {
        let outcome = self
            .parameters
            .bind_with_direction(name, &value, direction)
            .map(|_| ());
        self.settle(Some(normalize_name(name)), outcome);
        self
    }

    /// Bind every field of `record` by name
    pub fn with_parameters<R: ToParameters + ?Sized>(&mut self, record: &R) -> &mut Self {
        self.with_parameters_except(record, &[])
    }

    /// Bind every field of `record` except the names in `exclude`
    pub fn with_parameters_except<R: ToParameters + ?Sized>(
        &mut self,
        record: &R,
        exclude: &[&str],
    ) -> &mut Self {
        let outcome = self.parameters.bind_record(record, exclude).map(|_| ());
        self.settle(None, outcome);
        self
    }

    /// Merge a prepared set of bindings
    pub fn with_parameter_set(&mut self, parameters: ParameterSet) -> &mut Self {
        for parameter in &parameters {
            let key = Some(parameter.key());
            self.unresolved.retain(|pending| *pending != key);
        }
        self.parameters.extend(parameters);
        self
    }

    /// Deadline for each execution of this command
    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    fn settle(&mut self, key: Option<String>, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.unresolved.retain(|pending| *pending != key),
            Err(err) => {
                // an empty name never held a value
                let named = key.as_deref().map_or(true, |name| !name.is_empty());
                if named && !self.unresolved.contains(&key) {
                    self.unresolved.push(key);
                }
                if self.deferred.is_none() {
                    self.deferred = Some(err);
                }
            }
        }
    }

    fn begin(&mut self) -> Result<(CommandContext, Option<Duration>)> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        if let Some(pending) = self.unresolved.first() {
            return Err(DatabaseError::binding(match pending {
                Some(name) => format!(
                    "parameter '{}' has no usable value since its last binding failed",
                    name
                ),
                None => "record parameters have no usable values since binding them failed"
                    .to_string(),
            }));
        }
        if !self.output_capable
            && matches!(self.state, CommandState::Ready(_) | CommandState::Prepared(_))
        {
            self.parameters.require_input_only(&self.driver)?;
        }
        let context = CommandContext::new(&self.sql, self.parameters.names());
        Ok((context, self.timeout.or(self.default_timeout)))
    }

    fn prepared<'s>(
        state: &'s mut CommandState<'c>,
        sql: &str,
    ) -> Result<&'s mut Box<dyn NativeCommand + 'c>> {
        if matches!(state, CommandState::Ready(_)) {
            if let CommandState::Ready(native) = std::mem::replace(state, CommandState::Failed) {
                if native.is_closed() {
                    *state = CommandState::Closed;
                } else {
                    *state = CommandState::Prepared(native.prepare(sql)?);
                }
            }
        }
        match state {
            CommandState::Prepared(command) => Ok(command),
            CommandState::Closed => Err(DatabaseError::invalid_operation("connection is closed")),
            CommandState::Failed | CommandState::Ready(_) => Err(DatabaseError::invalid_operation(
                "command failed to prepare earlier; create a new command",
            )),
        }
    }

    /// Execute and return the number of affected rows
    pub fn as_non_query(&mut self) -> Result<u64> {
        let (context, timeout) = self.begin()?;
        let started = Instant::now();
        let command =
            Self::prepared(&mut self.state, &self.sql).map_err(|e| e.in_command(&context))?;
        let affected = command
            .execute(&self.parameters, timeout)
            .map_err(|e| e.in_command(&context))?;
        debug!(
            sql = %context.fingerprint,
            params = ?context.parameters,
            affected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "non-query executed"
        );
        Ok(affected)
    }

    /// Execute and return the first column of the first row
    ///
    /// Zero rows yield the target's null state (`None` for `Option<T>`) or
    /// [`DatabaseError::NoResult`].
    pub fn as_scalar<T: FromValue>(&mut self) -> Result<T> {
        let fingerprint = fingerprint(&self.sql);
        let mut reader = self.as_reader()?;
        let scalar = match reader.next_row()? {
            Some(row) => row
                .get_ordinal(0)?
                .convert(row.column_name(0).unwrap_or_default()),
            None => T::from_null().ok_or_else(|| {
                DatabaseError::no_result(format!("scalar query returned no rows: {}", fingerprint))
            }),
        };
        scalar
    }

    /// Materialize the first row
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NoResult`] if the query produced no rows.
    pub fn as_single<T: FromRow>(&mut self) -> Result<T> {
        let fingerprint = fingerprint(&self.sql);
        self.as_optional()?.ok_or_else(|| {
            DatabaseError::no_result(format!("query returned no rows: {}", fingerprint))
        })
    }

    /// Materialize the first row, if any
    pub fn as_optional<T: FromRow>(&mut self) -> Result<Option<T>> {
        let mut reader = self.as_reader()?;
        let record = match reader.next_row()? {
            Some(row) => T::from_row(&row).map(Some),
            None => Ok(None),
        };
        record
    }

    /// Execute and open a forward-only reader over the result
    pub fn as_reader(&mut self) -> Result<Reader<'_>> {
        let (context, timeout) = self.begin()?;
        let started = Instant::now();
        let command =
            Self::prepared(&mut self.state, &self.sql).map_err(|e| e.in_command(&context))?;
        let cursor = command
            .query(&self.parameters, timeout)
            .map_err(|e| e.in_command(&context))?;
        debug!(
            sql = %context.fingerprint,
            params = ?context.parameters,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reader opened"
        );
        Ok(Reader::new(cursor, context))
    }

    /// Execute and map each row through `mapper`
    pub fn as_enumerable<T, F>(&mut self, mapper: F) -> Result<Enumerable<'_, T, F>>
    where
        F: FnMut(&RowView<'_>) -> Result<T>,
    {
        Ok(Enumerable::new(self.as_reader()?, mapper))
    }

    /// Execute and materialize each row with [`FromRow`]
    pub fn as_records<T: FromRow>(&mut self) -> Result<Enumerable<'_, T, RecordMapper<T>>> {
        self.as_enumerable(T::from_row as RecordMapper<T>)
    }
}

/// Forward-only reader over a result
///
/// The underlying cursor is released when the reader is exhausted, fails,
/// is closed, or is dropped.
pub struct Reader<'r> {
    cursor: Option<Box<dyn NativeCursor + 'r>>,
    columns: Columns,
    current: Vec<DatabaseValue>,
    context: CommandContext,
    rows: u64,
}

impl<'r> Reader<'r> {
    fn new(cursor: Box<dyn NativeCursor + 'r>, context: CommandContext) -> Self {
        let columns = Columns::new(cursor.columns().to_vec());
        Self {
            cursor: Some(cursor),
            columns,
            current: Vec::new(),
            context,
            rows: 0,
        }
    }

    /// Advance to the next row
    ///
    /// The returned view borrows the reader and is invalidated by the next
    /// call. Returns `None` once the result is exhausted or the reader is
    /// closed.
    pub fn next_row(&mut self) -> Result<Option<RowView<'_>>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        match cursor.next_row() {
            Ok(Some(values)) => {
                self.rows += 1;
                self.current = values;
                Ok(Some(RowView::new(&self.columns, &self.current)))
            }
            Ok(None) => {
                self.close();
                Ok(None)
            }
            Err(err) => {
                self.close();
                Err(err.in_command(&self.context))
            }
        }
    }

    /// Result column metadata
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Release the cursor; later reads return `None`
    pub fn close(&mut self) {
        if self.cursor.take().is_some() {
            self.current.clear();
            debug!(sql = %self.context.fingerprint, rows = self.rows, "reader released");
        }
    }

    /// True once the cursor has been released
    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    /// Rows read so far
    pub fn rows_read(&self) -> u64 {
        self.rows
    }
}

/// Lazy sequence of records mapped from a [`Reader`]
///
/// A mapper failure ends the sequence with that error and releases the
/// reader, unless [`best_effort`](Self::best_effort) is enabled.
pub struct Enumerable<'r, T, F> {
    reader: Reader<'r>,
    mapper: F,
    best_effort: bool,
    skipped: u64,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T, F> Enumerable<'r, T, F>
where
    F: FnMut(&RowView<'_>) -> Result<T>,
{
    fn new(reader: Reader<'r>, mapper: F) -> Self {
        Self {
            reader,
            mapper,
            best_effort: false,
            skipped: 0,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Skip rows the mapper rejects instead of stopping
    ///
    /// Driver failures still end the sequence.
    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    /// Rows skipped in best-effort mode
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Release the reader early
    pub fn close(&mut self) {
        self.done = true;
        self.reader.close();
    }
}

impl<'r, T, F> Iterator for Enumerable<'r, T, F>
where
    F: FnMut(&RowView<'_>) -> Result<T>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let row = match self.reader.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            match (self.mapper)(&row) {
                Ok(record) => return Some(Ok(record)),
                Err(err) if self.best_effort => {
                    self.skipped += 1;
                    warn!(error = %err, skipped = self.skipped, "skipping row that failed to map");
                }
                Err(err) => {
                    self.close();
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

impl<'r, T, F> std::iter::FusedIterator for Enumerable<'r, T, F> where
    F: FnMut(&RowView<'_>) -> Result<T>
{
}
