//! Transaction guard for automatic rollback on drop
//!
//! A [`Transaction`] borrows its connection for its whole lifetime, so every
//! command issued while it is alive goes through [`Transaction::sql`] and runs
//! inside it. If the guard is dropped without [`commit`](Transaction::commit),
//! the transaction is rolled back.
//!
//! # Example
//!
//! ```rust,no_run
//! use rust_db_access::prelude::*;
//!
//! fn transfer(conn: &mut Connection<'_>) -> Result<()> {
//!     let mut tx = conn.begin_transaction()?;
//!     tx.sql("UPDATE accounts SET balance = balance - @amount WHERE id = @id")
//!         .with_parameter("amount", 100)
//!         .with_parameter("id", 1)
//!         .as_non_query()?;
//!     tx.sql("UPDATE accounts SET balance = balance + @amount WHERE id = @id")
//!         .with_parameter("amount", 100)
//!         .with_parameter("id", 2)
//!         .as_non_query()?;
//!     tx.commit()
//! }
//! ```
//!
//! An early return through `?` drops the guard and rolls back.

use super::command::CommandBuilder;
use super::driver::NativeConnection;
use super::error::Result;
use std::time::Duration;
use tracing::{debug, warn};

/// Transaction guard that rolls back on drop if not committed
pub struct Transaction<'t> {
    native: &'t mut dyn NativeConnection,
    command_timeout: Option<Duration>,
    finished: bool,
}

impl<'t> Transaction<'t> {
    pub(crate) fn begin(
        native: &'t mut dyn NativeConnection,
        command_timeout: Option<Duration>,
    ) -> Result<Self> {
        native.begin()?;
        debug!(driver = native.driver_name(), "transaction started");
        Ok(Self {
            native,
            command_timeout,
            finished: false,
        })
    }

    /// Start a command inside the transaction
    pub fn sql(&mut self, sql: impl Into<String>) -> CommandBuilder<'_> {
        CommandBuilder::new(&mut *self.native, sql, self.command_timeout)
    }

    /// Execute a statement without parameters inside the transaction
    pub fn execute(&mut self, sql: impl Into<String>) -> Result<u64> {
        self.sql(sql).as_non_query()
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns the driver error if the commit fails; the guard is consumed
    /// either way and will not attempt a rollback.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.native.commit()?;
        debug!(driver = self.native.driver_name(), "transaction committed");
        Ok(())
    }

    /// Roll the transaction back
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.native.rollback()?;
        debug!(driver = self.native.driver_name(), "transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished || !self.native.in_transaction() {
            return;
        }
        warn!(
            driver = self.native.driver_name(),
            "transaction dropped without commit, rolling back"
        );
        if let Err(err) = self.native.rollback() {
            warn!(error = %err, "implicit rollback failed");
        }
    }
}
