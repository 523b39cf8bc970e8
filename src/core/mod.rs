//! Core data-access types
//!
//! Profiles and the driver boundary, the connection handle, parameter
//! binding, the command builder, row materialization and errors.

pub mod async_connection;
pub mod command;
pub mod config;
pub mod connection;
pub mod database_types;
pub mod driver;
pub mod error;
pub mod parameter;
pub mod record;
pub mod row;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use async_connection::AsyncConnection;
pub use command::{CommandBuilder, Enumerable, Reader, RecordMapper};
pub use config::{Profile, ProviderRegistry};
pub use connection::{Connection, ConnectionInfo};
pub use database_types::DatabaseType;
pub use driver::{register_driver, resolve_driver, Driver, NativeCommand, NativeConnection, NativeCursor};
pub use error::{CommandContext, DatabaseError, ErrorKind, Result};
pub use parameter::{Parameter, ParameterDirection, ParameterSet, ToParameters};
pub use row::{Columns, DatabaseRow, FromRow, RowView};
pub use transaction::Transaction;
pub use value::{DatabaseValue, DbType, FromValue, ToValue};
