//! Async wrapper around [`Connection`]
//!
//! The core API is blocking. [`AsyncConnection`] offloads each call to the
//! blocking thread pool and races it against a deadline with
//! `tokio::select!`. A call that misses its deadline leaves the native
//! connection in an unknown state, so the handle is marked abandoned and
//! every later call fails with [`DatabaseError::InvalidOperation`].

use super::config::Profile;
use super::connection::Connection;
use super::error::{DatabaseError, Result};
use super::parameter::ParameterSet;
use super::row::FromRow;
use super::value::FromValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

/// Default deadline for each call (30 seconds)
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Shareable async handle to an owned connection
#[derive(Clone)]
pub struct AsyncConnection {
    inner: Arc<Mutex<Option<Connection<'static>>>>,
    abandoned: Arc<AtomicBool>,
    timeout: Duration,
    command_timeout: Option<Duration>,
}

impl AsyncConnection {
    /// Open a connection for `profile` on the blocking thread pool
    pub async fn open(profile: Profile) -> Result<Self> {
        let mut task = tokio::task::spawn_blocking(move || Connection::open(&profile));

        tokio::select! {
            result = &mut task => {
                let connection = result.map_err(|e| {
                    DatabaseError::connection(format!("open task failed: {}", e))
                })??;
                Ok(Self::from_connection(connection))
            }
            _ = tokio::time::sleep(DEFAULT_OPERATION_TIMEOUT) => {
                task.abort();
                Err(DatabaseError::timeout(DEFAULT_OPERATION_TIMEOUT.as_millis() as u64))
            }
        }
    }

    /// Wrap an already open connection
    pub fn from_connection(connection: Connection<'static>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(connection))),
            abandoned: Arc::new(AtomicBool::new(false)),
            timeout: DEFAULT_OPERATION_TIMEOUT,
            command_timeout: None,
        }
    }

    /// Deadline applied to each call, and passed on as the command timeout
    /// unless [`with_command_timeout`](Self::with_command_timeout) sets one
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Timeout enforced by the driver inside each call
    ///
    /// A command timeout shorter than the call deadline fails the statement
    /// while the connection stays usable.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// True once a call has missed its deadline
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Execute a non-query command
    pub async fn execute(&self, sql: impl Into<String>, parameters: ParameterSet) -> Result<u64> {
        let sql = sql.into();
        self.run(move |conn| conn.sql(sql).with_parameter_set(parameters).as_non_query())
            .await
    }

    /// Execute and return the first column of the first row
    pub async fn scalar<T>(&self, sql: impl Into<String>, parameters: ParameterSet) -> Result<T>
    where
        T: FromValue + Send + 'static,
    {
        let sql = sql.into();
        self.run(move |conn| conn.sql(sql).with_parameter_set(parameters).as_scalar())
            .await
    }

    /// Execute and materialize every row
    pub async fn query<T>(&self, sql: impl Into<String>, parameters: ParameterSet) -> Result<Vec<T>>
    where
        T: FromRow + Send + 'static,
    {
        let sql = sql.into();
        self.run(move |conn| {
            let mut command = conn.sql(sql);
            command.with_parameter_set(parameters);
            let records: Result<Vec<T>> = command.as_records::<T>()?.collect();
            records
        })
        .await
    }

    /// Close the connection; later calls fail
    pub async fn close(&self) -> Result<()> {
        let connection = self.inner.lock().await.take();
        match connection {
            Some(mut connection) => tokio::task::spawn_blocking(move || connection.close())
                .await
                .map_err(|e| DatabaseError::connection(format!("close task failed: {}", e)))?,
            None => Ok(()),
        }
    }

    async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection<'static>) -> Result<T> + Send + 'static,
    {
        if self.is_abandoned() {
            return Err(DatabaseError::invalid_operation(
                "connection was abandoned after a timeout",
            ));
        }

        let mut guard = Arc::clone(&self.inner).lock_owned().await;
        let timeout = self.timeout;
        let command_timeout = self.command_timeout.unwrap_or(timeout);
        let mut task = tokio::task::spawn_blocking(move || match guard.as_mut() {
            Some(connection) => {
                connection.set_command_timeout(Some(command_timeout));
                operation(connection)
            }
            None => Err(DatabaseError::invalid_operation("connection is closed")),
        });

        tokio::select! {
            result = &mut task => {
                result.map_err(|e| DatabaseError::invalid_operation(format!("task failed: {}", e)))?
            }
            _ = tokio::time::sleep(timeout) => {
                task.abort();
                self.abandoned.store(true, Ordering::Release);
                warn!(timeout_ms = timeout.as_millis() as u64, "call missed its deadline, abandoning connection");
                Err(DatabaseError::timeout(timeout.as_millis() as u64))
            }
        }
    }
}
