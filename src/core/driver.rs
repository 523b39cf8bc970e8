//! Native driver boundary
//!
//! The core only talks to databases through these traits. A [`Driver`] opens
//! [`NativeConnection`]s; a connection prepares [`NativeCommand`]s; a command
//! executes with a [`ParameterSet`] or opens a forward-only [`NativeCursor`].
//!
//! Lifetimes carry the resource model: a prepared command borrows its
//! connection and a cursor borrows its command, so nothing else can run on a
//! connection while a cursor over it is alive, and dropping the cursor is what
//! releases it.

use super::database_types::DatabaseType;
use super::error::{DatabaseError, Result};
use super::parameter::ParameterSet;
use super::value::DatabaseValue;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Factory for native connections, selected by a profile's driver identifier
pub trait Driver: Send + Sync {
    /// Canonical identifier, used in logs
    fn name(&self) -> &str;

    /// Open a connection
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Connection`] on network, authentication or
    /// driver failure.
    fn open(&self, connection_string: &str) -> Result<Box<dyn NativeConnection>>;
}

/// An open native connection
pub trait NativeConnection: Send {
    /// Identifier of the driver that produced this connection
    fn driver_name(&self) -> &str;

    /// Prepare `sql` for (repeated) execution
    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn NativeCommand + 'c>>;

    /// Start a transaction
    fn begin(&mut self) -> Result<()>;

    /// Commit the active transaction
    fn commit(&mut self) -> Result<()>;

    /// Roll back the active transaction
    fn rollback(&mut self) -> Result<()>;

    /// True while a transaction is active
    fn in_transaction(&self) -> bool;

    /// Whether output and in-out parameters can be bound
    fn supports_output_parameters(&self) -> bool {
        false
    }

    /// Close the connection; later calls are no-ops
    fn close(&mut self) -> Result<()>;

    /// True once closed
    fn is_closed(&self) -> bool;
}

/// A prepared statement, re-executable with fresh bindings
pub trait NativeCommand {
    /// Execute and return the number of affected rows
    fn execute(&mut self, parameters: &ParameterSet, timeout: Option<Duration>) -> Result<u64>;

    /// Execute and open a forward-only cursor over the result
    fn query<'s>(
        &'s mut self,
        parameters: &ParameterSet,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn NativeCursor + 's>>;
}

/// Forward-only result cursor
pub trait NativeCursor {
    /// Result column names, in ordinal order
    fn columns(&self) -> &[String];

    /// Fetch the next row, `None` once exhausted
    fn next_row(&mut self) -> Result<Option<Vec<DatabaseValue>>>;
}

static DRIVERS: Lazy<RwLock<HashMap<String, Arc<dyn Driver>>>> = Lazy::new(|| {
    let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
    for (database_type, driver) in crate::backends::builtin_drivers() {
        for alias in database_type.aliases() {
            drivers.insert(alias.to_string(), Arc::clone(&driver));
        }
    }
    RwLock::new(drivers)
});

/// Register a driver under `identifier` (case-insensitive), replacing any
/// earlier registration
pub fn register_driver(identifier: &str, driver: Arc<dyn Driver>) {
    DRIVERS
        .write()
        .insert(identifier.trim().to_lowercase(), driver);
}

/// Find the driver registered under `identifier`
///
/// # Errors
///
/// Returns [`DatabaseError::Configuration`] if no driver is registered, with a
/// hint when the identifier names a built-in driver compiled out by features.
pub fn resolve_driver(identifier: &str) -> Result<Arc<dyn Driver>> {
    let key = identifier.trim().to_lowercase();
    if let Some(driver) = DRIVERS.read().get(&key) {
        return Ok(Arc::clone(driver));
    }
    match key.parse::<DatabaseType>() {
        Ok(database_type) => Err(DatabaseError::configuration(format!(
            "driver '{}' is not compiled in (enable the `{}` feature)",
            identifier, database_type
        ))),
        Err(_) => Err(DatabaseError::configuration(format!(
            "no driver registered for '{}'",
            identifier
        ))),
    }
}
