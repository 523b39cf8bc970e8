//! Error types for the data-access layer
//!
//! Every failure surfaces as a [`DatabaseError`]. Callers that only care about
//! the category of a failure use [`DatabaseError::kind`], which sees through
//! the [`DatabaseError::Command`] wrapper added around driver failures.

use std::fmt;

/// Result type alias for data-access operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Longest SQL fingerprint kept in error context
const FINGERPRINT_MAX_LEN: usize = 96;

/// Category of a [`DatabaseError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown profile, unknown driver, malformed profile table
    Configuration,
    /// Open, authentication or network failure
    Connection,
    /// A parameter could not be bound
    Binding,
    /// A column value could not be converted to the target type
    Conversion,
    /// A null column value was read into a non-nullable target
    NullMapping,
    /// A scalar or single-row read produced no row
    NoResult,
    /// The command exceeded its deadline
    Timeout,
    /// Illegal state transition (closed handle, nested transaction, ...)
    InvalidOperation,
    /// A column requested by name is not part of the result
    ColumnNotFound,
    /// The driver rejected the statement (syntax, constraint, ...)
    Query,
    /// IO failure while loading configuration
    Io,
}

/// Diagnostic context attached to driver failures
///
/// Carries a fingerprint of the SQL text and the parameter names. Parameter
/// values are never recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Whitespace-collapsed, truncated SQL text
    pub fingerprint: String,
    /// Names of the bound parameters, in binding order
    pub parameters: Vec<String>,
}

impl CommandContext {
    /// Build a context from raw SQL text and parameter names
    pub fn new<I, S>(sql: &str, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fingerprint: fingerprint(sql),
            parameters: parameters.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sql=\"{}\"", self.fingerprint)?;
        if !self.parameters.is_empty() {
            write!(f, " params=[{}]", self.parameters.join(", "))?;
        }
        Ok(())
    }
}

/// Collapse whitespace and cut long statements so they fit in a log line
pub fn fingerprint(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= FINGERPRINT_MAX_LEN {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(FINGERPRINT_MAX_LEN).collect();
    cut.push_str("...");
    cut
}

/// Error types for data-access operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Configuration error (unknown profile or driver, bad profile table)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Parameter binding error
    #[error("Binding error: {0}")]
    Binding(String),

    /// Type conversion error
    #[error("Cannot convert column '{column}' ({actual}) to {target}")]
    Conversion {
        column: String,
        target: String,
        actual: String,
    },

    /// Null read into a non-nullable target
    #[error("Column '{column}' is null but {target} is not nullable")]
    NullMapping { column: String, target: String },

    /// Zero rows where one was required
    #[error("No result: {0}")]
    NoResult(String),

    /// Command timeout
    #[error("Command timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Illegal state transition
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Statement rejected by the driver
    #[error("Query error: {0}")]
    Query(String),

    /// Driver failure annotated with the command that caused it
    #[error("{source} ({context})")]
    Command {
        context: CommandContext,
        #[source]
        source: Box<DatabaseError>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Profile table could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),
}

impl DatabaseError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Configuration(msg.into())
    }

    /// Create a connection error without an underlying cause
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping the driver's cause
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DatabaseError::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a binding error
    pub fn binding<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Binding(msg.into())
    }

    /// Create a conversion error
    pub fn conversion(column: &str, target: &str, actual: &str) -> Self {
        DatabaseError::Conversion {
            column: column.to_string(),
            target: target.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a null mapping error
    pub fn null_mapping(column: &str, target: &str) -> Self {
        DatabaseError::NullMapping {
            column: column.to_string(),
            target: target.to_string(),
        }
    }

    /// Create a no-result error
    pub fn no_result<S: Into<String>>(msg: S) -> Self {
        DatabaseError::NoResult(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        DatabaseError::Timeout { timeout_ms }
    }

    /// Create an invalid operation error
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        DatabaseError::InvalidOperation(msg.into())
    }

    /// Create a query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Query(msg.into())
    }

    /// Name the record field a conversion or null-mapping error was reading
    /// into
    ///
    /// Other errors pass through unchanged.
    pub fn for_field(self, field: &str) -> Self {
        match self {
            DatabaseError::Conversion {
                column,
                target,
                actual,
            } => DatabaseError::Conversion {
                column,
                target: format!("field '{}' ({})", field, target),
                actual,
            },
            DatabaseError::NullMapping { column, target } => DatabaseError::NullMapping {
                column,
                target: format!("field '{}' ({})", field, target),
            },
            other => other,
        }
    }

    /// Attach command context, unless the error already carries some
    pub fn in_command(self, context: &CommandContext) -> Self {
        match self {
            DatabaseError::Command { .. } => self,
            other => DatabaseError::Command {
                context: context.clone(),
                source: Box::new(other),
            },
        }
    }

    /// The command context, if this error was raised while executing one
    pub fn context(&self) -> Option<&CommandContext> {
        match self {
            DatabaseError::Command { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::Configuration(_) | DatabaseError::Json(_) => ErrorKind::Configuration,
            DatabaseError::Connection { .. } => ErrorKind::Connection,
            DatabaseError::Binding(_) => ErrorKind::Binding,
            DatabaseError::Conversion { .. } => ErrorKind::Conversion,
            DatabaseError::NullMapping { .. } => ErrorKind::NullMapping,
            DatabaseError::NoResult(_) => ErrorKind::NoResult,
            DatabaseError::Timeout { .. } => ErrorKind::Timeout,
            DatabaseError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            DatabaseError::ColumnNotFound(_) => ErrorKind::ColumnNotFound,
            DatabaseError::Query(_) => ErrorKind::Query,
            DatabaseError::Command { source, .. } => source.kind(),
            DatabaseError::Io(_) => ErrorKind::Io,
            #[cfg(feature = "sqlite")]
            DatabaseError::Sqlite(_) => ErrorKind::Query,
            #[cfg(feature = "postgres")]
            DatabaseError::Postgres(_) => ErrorKind::Query,
        }
    }
}
