//! PostgreSQL driver
//!
//! Built on the synchronous `postgres` client. Placeholders are positional
//! (`$1..$n`): bindings are sent in the order they were first bound, and
//! re-binding a name keeps its position. Every placeholder must be bound, and
//! each value is coerced to the type the server declared for its placeholder.
//!
//! Command timeouts map to `statement_timeout`; a cancelled statement
//! surfaces as [`DatabaseError::Timeout`].
//!
//! `numeric` columns are read as decimal strings so no precision is lost;
//! they convert to floats or integers on access.

use crate::core::{
    driver::{Driver, NativeCommand, NativeConnection, NativeCursor},
    error::{DatabaseError, Result},
    parameter::{Parameter, ParameterSet},
    value::{DatabaseValue, FromValue},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres::error::SqlState;
use postgres::fallible_iterator::FallibleIterator;
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls, Row, RowIter, Statement};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

const DRIVER_NAME: &str = "postgres";

type SqlParam = Box<dyn ToSql + Sync>;

/// Driver for libpq-style connection strings (`host=.. user=..` or URLs)
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDriver;

impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn open(&self, connection_string: &str) -> Result<Box<dyn NativeConnection>> {
        Ok(Box::new(PostgresConnection::open(connection_string)?))
    }
}

/// Native PostgreSQL connection
pub struct PostgresConnection {
    client: Option<Client>,
    in_transaction: bool,
    applied_timeout: Option<Duration>,
}

impl PostgresConnection {
    /// Connect without TLS
    pub fn open(connection_string: &str) -> Result<Self> {
        let client = Client::connect(connection_string, NoTls).map_err(|e| {
            DatabaseError::connection_with_source("failed to connect to PostgreSQL", e)
        })?;
        Ok(Self::from_client(client))
    }

    /// Wrap a connected client
    pub fn from_client(client: Client) -> Self {
        Self {
            client: Some(client),
            in_transaction: false,
            applied_timeout: None,
        }
    }

    fn client(&mut self) -> Result<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| DatabaseError::invalid_operation("postgres connection is closed"))
    }

    fn apply_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.applied_timeout == timeout {
            return Ok(());
        }
        let millis = timeout.map(|t| t.as_millis().max(1)).unwrap_or(0);
        self.client()?
            .batch_execute(&format!("SET statement_timeout = {}", millis))?;
        self.applied_timeout = timeout;
        Ok(())
    }
}

impl NativeConnection for PostgresConnection {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn NativeCommand + 'c>> {
        let statement = self.client()?.prepare(sql)?;
        Ok(Box::new(PostgresCommand {
            conn: self,
            statement,
            transition: transaction_transition(sql),
        }))
    }

    fn begin(&mut self) -> Result<()> {
        self.client()?.batch_execute("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.client()?.batch_execute("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.client()?.batch_execute("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn close(&mut self) -> Result<()> {
        self.in_transaction = false;
        match self.client.take() {
            Some(client) => client.close().map_err(|e| {
                DatabaseError::connection_with_source("failed to close PostgreSQL connection", e)
            }),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}

struct PostgresCommand<'c> {
    conn: &'c mut PostgresConnection,
    statement: Statement,
    /// Transaction state after this statement succeeds, when it changes it
    transition: Option<bool>,
}

/// Whether a statement opens (`Some(true)`) or ends (`Some(false)`) a
/// transaction
fn transaction_transition(sql: &str) -> Option<bool> {
    let mut words = sql
        .split_whitespace()
        .map(|word| word.trim_end_matches(';').to_ascii_uppercase());
    match words.next()?.as_str() {
        "BEGIN" | "START" => Some(true),
        "COMMIT" | "END" | "ABORT" => Some(false),
        "ROLLBACK" if words.any(|word| word == "TO") => None,
        "ROLLBACK" => Some(false),
        "PREPARE" => match words.next().as_deref() {
            Some("TRANSACTION") => Some(false),
            _ => None,
        },
        _ => None,
    }
}

impl PostgresCommand<'_> {
    fn bind(&self, parameters: &ParameterSet) -> Result<Vec<SqlParam>> {
        let types = self.statement.params();
        if types.len() != parameters.len() {
            return Err(DatabaseError::binding(format!(
                "statement has {} placeholders but {} parameters are bound",
                types.len(),
                parameters.len()
            )));
        }
        parameters
            .iter()
            .zip(types)
            .map(|(parameter, ty)| to_sql_param(parameter, ty))
            .collect()
    }
}

fn typed<T>(value: &DatabaseValue) -> Option<SqlParam>
where
    T: FromValue + ToSql + Sync + 'static,
{
    if value.is_null() {
        return Some(Box::new(None::<T>));
    }
    T::from_value(value).map(|v| Box::new(Some(v)) as SqlParam)
}

fn numeric(value: &DatabaseValue) -> Option<SqlParam> {
    let decimal = match value {
        DatabaseValue::Null => return Some(Box::new(None::<Decimal>)),
        DatabaseValue::Int(v) => Decimal::from(*v),
        DatabaseValue::Long(v) => Decimal::from(*v),
        DatabaseValue::Float(v) => Decimal::try_from(*v).ok()?,
        DatabaseValue::Double(v) => Decimal::try_from(*v).ok()?,
        DatabaseValue::String(v) => v.trim().parse::<Decimal>().ok()?,
        _ => return None,
    };
    Some(Box::new(Some(decimal)))
}

fn to_sql_param(parameter: &Parameter, ty: &Type) -> Result<SqlParam> {
    let value = &parameter.value;
    let param = match ty.name() {
        "bool" => typed::<bool>(value),
        "int2" => typed::<i16>(value),
        "int4" => typed::<i32>(value),
        "int8" => typed::<i64>(value),
        "float4" => typed::<f32>(value),
        "float8" => typed::<f64>(value),
        "text" | "varchar" | "bpchar" | "name" | "unknown" => match value {
            DatabaseValue::String(_) | DatabaseValue::Null => typed::<String>(value),
            _ => None,
        },
        "bytea" => typed::<Vec<u8>>(value),
        "uuid" => typed::<Uuid>(value),
        "timestamp" => typed::<NaiveDateTime>(value),
        "timestamptz" => typed::<DateTime<Utc>>(value),
        "date" => typed::<NaiveDate>(value),
        "numeric" => numeric(value),
        _ => None,
    };
    param.ok_or_else(|| {
        DatabaseError::binding(format!(
            "parameter '{}' ({}) cannot be bound to a {} placeholder",
            parameter.name,
            value.type_name(),
            ty.name()
        ))
    })
}

fn map_error(err: postgres::Error, timeout: Option<Duration>) -> DatabaseError {
    match (err.code(), timeout) {
        (Some(code), Some(timeout)) if *code == SqlState::QUERY_CANCELED => {
            DatabaseError::timeout(timeout.as_millis() as u64)
        }
        _ => DatabaseError::Postgres(err),
    }
}

impl NativeCommand for PostgresCommand<'_> {
    fn execute(&mut self, parameters: &ParameterSet, timeout: Option<Duration>) -> Result<u64> {
        let params = self.bind(parameters)?;
        self.conn.apply_timeout(timeout)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        let affected = self
            .conn
            .client()?
            .execute(&self.statement, &refs)
            .map_err(|e| map_error(e, timeout))?;
        if let Some(active) = self.transition {
            self.conn.in_transaction = active;
        }
        Ok(affected)
    }

    fn query<'s>(
        &'s mut self,
        parameters: &ParameterSet,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn NativeCursor + 's>> {
        let params = self.bind(parameters)?;
        self.conn.apply_timeout(timeout)?;
        let columns = self
            .statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = self
            .conn
            .client()?
            .query_raw(&self.statement, params.iter().map(|p| p.as_ref() as &dyn ToSql))
            .map_err(|e| map_error(e, timeout))?;
        if let Some(active) = self.transition {
            self.conn.in_transaction = active;
        }
        Ok(Box::new(PostgresCursor {
            rows,
            columns,
            timeout,
        }))
    }
}

struct PostgresCursor<'s> {
    rows: RowIter<'s>,
    columns: Vec<String>,
    timeout: Option<Duration>,
}

impl NativeCursor for PostgresCursor<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<DatabaseValue>>> {
        let timeout = self.timeout;
        match self.rows.next().map_err(|e| map_error(e, timeout))? {
            Some(row) => (0..row.len())
                .map(|index| column_value(&row, index))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            None => Ok(None),
        }
    }
}

fn column_value(row: &Row, index: usize) -> Result<DatabaseValue> {
    let column = &row.columns()[index];
    let value = match column.type_().name() {
        "bool" => row.try_get::<_, Option<bool>>(index)?.map(DatabaseValue::Bool),
        "int2" => row
            .try_get::<_, Option<i16>>(index)?
            .map(|v| DatabaseValue::Int(i32::from(v))),
        "int4" => row.try_get::<_, Option<i32>>(index)?.map(DatabaseValue::Int),
        "int8" => row.try_get::<_, Option<i64>>(index)?.map(DatabaseValue::Long),
        "float4" => row.try_get::<_, Option<f32>>(index)?.map(DatabaseValue::Float),
        "float8" => row.try_get::<_, Option<f64>>(index)?.map(DatabaseValue::Double),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(index)?.map(DatabaseValue::Bytes),
        "uuid" => row.try_get::<_, Option<Uuid>>(index)?.map(DatabaseValue::Guid),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(DatabaseValue::DateTime),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(|v| DatabaseValue::DateTime(v.naive_utc())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(index)?
            .map(|v| DatabaseValue::DateTime(v.and_time(chrono::NaiveTime::MIN))),
        "numeric" => row
            .try_get::<_, Option<Decimal>>(index)?
            .map(|v| DatabaseValue::String(v.to_string())),
        other => match row.try_get::<_, Option<String>>(index) {
            Ok(v) => v.map(DatabaseValue::String),
            Err(_) => {
                return Err(DatabaseError::conversion(
                    column.name(),
                    "a supported column type",
                    other,
                ))
            }
        },
    };
    Ok(value.unwrap_or(DatabaseValue::Null))
}
