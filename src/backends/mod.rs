//! Built-in drivers
//!
//! Each driver is compiled in by its cargo feature and registered in the
//! driver table under every alias of its [`DatabaseType`].

use crate::core::database_types::DatabaseType;
use crate::core::driver::Driver;
use std::sync::Arc;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteDriver};

#[cfg(feature = "postgres")]
pub use self::postgres::{PostgresConnection, PostgresDriver};

/// Drivers compiled into this build
pub(crate) fn builtin_drivers() -> Vec<(DatabaseType, Arc<dyn Driver>)> {
    #[allow(unused_mut)]
    let mut drivers: Vec<(DatabaseType, Arc<dyn Driver>)> = Vec::new();
    #[cfg(feature = "sqlite")]
    drivers.push((DatabaseType::Sqlite, Arc::new(SqliteDriver)));
    #[cfg(feature = "postgres")]
    drivers.push((DatabaseType::Postgres, Arc::new(PostgresDriver)));
    drivers
}
