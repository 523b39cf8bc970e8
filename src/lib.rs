//! # Rust DB Access
//!
//! A small data-access layer between application code and a relational
//! database driver. It covers four things:
//!
//! - connections opened from named configuration profiles,
//! - a fluent command builder for parameterized SQL,
//! - execution as non-query, scalar, single row, or a lazy row sequence,
//! - mapping rows onto plain structs declared with [`record!`].
//!
//! It is not an ORM: there is no change tracking, no query DSL and no
//! connection pool.
//!
//! ## Supported Databases
//!
//! | Database | Feature | Driver |
//! |----------|---------|--------|
//! | SQLite | `sqlite` (default) | rusqlite, bundled |
//! | PostgreSQL | `postgres` | postgres (sync client) |
//!
//! Other drivers plug in through [`register_driver`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_db_access::prelude::*;
//!
//! record! {
//!     #[derive(Debug)]
//!     pub struct Person {
//!         pub id: i64,
//!         pub name: String,
//!         pub email: Option<String>,
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let registry = ProviderRegistry::new()
//!         .with_profile(Profile::new("main", "sqlite", "Data Source=app.db"));
//!     let mut conn = Connection::open_with(&registry, "main")?;
//!
//!     conn.execute("CREATE TABLE IF NOT EXISTS person (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)")?;
//!
//!     let ann = Person { id: 1, name: "Ann".into(), email: None };
//!     conn.sql("INSERT INTO person (id, name, email) VALUES (@id, @name, @email)")
//!         .with_parameters(&ann)
//!         .as_non_query()?;
//!
//!     let count: i64 = conn.sql("SELECT count(*) FROM person").as_scalar()?;
//!     println!("{} people", count);
//!
//!     for person in conn.sql("SELECT * FROM person").as_records::<Person>()? {
//!         println!("{:?}", person?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/
//! │   ├── config.rs          # Profiles, provider registry, connection strings
//! │   ├── driver.rs          # Native driver traits and driver table
//! │   ├── connection.rs      # Connection handle
//! │   ├── transaction.rs     # Transaction guard
//! │   ├── parameter.rs       # Parameter binding
//! │   ├── command.rs         # Command builder, reader, enumerable
//! │   ├── row.rs             # Row view and FromRow
//! │   ├── record.rs          # record! macro
//! │   ├── value.rs           # Value types and conversions
//! │   ├── database_types.rs  # Built-in database kinds and aliases
//! │   ├── error.rs           # Error types
//! │   └── async_connection.rs
//! └── backends/
//!     ├── sqlite.rs
//!     └── postgres.rs
//! ```

/// Core data-access types and traits
pub mod core;

/// Built-in driver implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_db_access::prelude::*;
///
/// fn main() -> Result<()> {
///     let mut conn = Connection::open(&Profile::new("mem", "sqlite", ":memory:"))?;
///     let answer: i64 = conn.sql("SELECT 42").as_scalar()?;
///     assert_eq!(answer, 42);
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::core::{
        AsyncConnection, CommandBuilder, Connection, DatabaseError, DatabaseRow, DatabaseType,
        DatabaseValue, ErrorKind, FromRow, FromValue, ParameterSet, Profile, ProviderRegistry,
        Result, RowView, ToParameters, ToValue, Transaction,
    };
    pub use crate::record;
}

// Re-export at root level for convenience
pub use crate::core::{
    register_driver, AsyncConnection, CommandBuilder, CommandContext, Connection,
    ConnectionInfo, DatabaseError, DatabaseRow, DatabaseType, DatabaseValue,
    DbType, Driver, Enumerable, ErrorKind, FromRow, FromValue, NativeCommand, NativeConnection,
    NativeCursor, Parameter, ParameterDirection, ParameterSet, Profile, ProviderRegistry, Reader,
    Result, RowView, ToParameters, ToValue, Transaction,
};
