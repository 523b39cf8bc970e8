//! Row materialization
//!
//! A [`RowView`] is a borrowed, column-name-indexed view of the row a cursor
//! is positioned on. [`FromRow`] turns a view into a detached value. The
//! [`Reader`](super::command::Reader) and
//! [`Enumerable`](super::command::Enumerable) types built on top live in
//! [`command`](super::command).

use super::error::{DatabaseError, Result};
use super::value::{DatabaseValue, FromValue};
use std::collections::HashMap;

/// Detached row as a column name → value map
pub type DatabaseRow = HashMap<String, DatabaseValue>;

/// Column names of a result, with a case-insensitive index
#[derive(Debug, Clone, Default)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    /// Index `names`; when a name repeats, lookups resolve to the first one
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (ordinal, name) in names.iter().enumerate() {
            index.entry(name.to_lowercase()).or_insert(ordinal);
        }
        Self { names, index }
    }

    /// Ordinal of `name`, matched case-insensitively
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_lowercase()).copied()
    }

    /// Column names in ordinal order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True for a result without columns
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Borrowed view of the current row
///
/// Only valid until the reader advances; the borrow checker enforces this.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'r> {
    columns: &'r Columns,
    values: &'r [DatabaseValue],
}

impl<'r> RowView<'r> {
    /// Create a view over one row of values
    pub fn new(columns: &'r Columns, values: &'r [DatabaseValue]) -> Self {
        Self { columns, values }
    }

    /// Value of column `name`
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ColumnNotFound`] if the result has no such
    /// column.
    pub fn get(&self, name: &str) -> Result<&'r DatabaseValue> {
        self.try_get(name)
            .ok_or_else(|| DatabaseError::ColumnNotFound(name.to_string()))
    }

    /// Value of column `name`, `None` if the result has no such column
    pub fn try_get(&self, name: &str) -> Option<&'r DatabaseValue> {
        self.columns
            .ordinal(name)
            .and_then(|ordinal| self.values.get(ordinal))
    }

    /// Value of column `name` converted to `T`
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        self.get(name)?.convert(name)
    }

    /// Overwrite `field` with column `name`, leaving it untouched when the
    /// result has no such column
    pub fn assign<T: FromValue>(&self, name: &str, field: &mut T) -> Result<()> {
        if let Some(value) = self.try_get(name) {
            *field = value.convert(name)?;
        }
        Ok(())
    }

    /// Value at `ordinal`
    pub fn get_ordinal(&self, ordinal: usize) -> Result<&'r DatabaseValue> {
        self.values.get(ordinal).ok_or_else(|| {
            DatabaseError::ColumnNotFound(format!(
                "ordinal {} (row has {} columns)",
                ordinal,
                self.values.len()
            ))
        })
    }

    /// Value at `ordinal` converted to `T`
    pub fn get_ordinal_as<T: FromValue>(&self, ordinal: usize) -> Result<T> {
        let value = self.get_ordinal(ordinal)?;
        value.convert(self.column_name(ordinal).unwrap_or("?"))
    }

    /// Name of the column at `ordinal`
    pub fn column_name(&self, ordinal: usize) -> Option<&'r str> {
        self.columns.names().get(ordinal).map(String::as_str)
    }

    /// Column metadata
    pub fn columns(&self) -> &'r Columns {
        self.columns
    }

    /// Values in ordinal order
    pub fn values(&self) -> &'r [DatabaseValue] {
        self.values
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for a row without columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Detach into a name → value map (first column wins on duplicate names)
    pub fn to_map(&self) -> DatabaseRow {
        let mut row = DatabaseRow::with_capacity(self.values.len());
        for (name, value) in self.columns.names().iter().zip(self.values) {
            row.entry(name.clone()).or_insert_with(|| value.clone());
        }
        row
    }
}

/// Construction of a detached value from the current row
///
/// Usually generated by [`record!`](crate::record); implement it by hand for
/// anything the macro cannot express.
pub trait FromRow: Sized {
    /// Materialize `row`
    ///
    /// # Errors
    ///
    /// Conversion and null-mapping failures name the offending column.
    fn from_row(row: &RowView<'_>) -> Result<Self>;
}

impl FromRow for DatabaseRow {
    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(row.to_map())
    }
}

impl FromRow for Vec<DatabaseValue> {
    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(row.values().to_vec())
    }
}

macro_rules! from_row_tuple {
    ($($ty:ident => $ordinal:tt),+) => {
        impl<$($ty: FromValue),+> FromRow for ($($ty,)+) {
            fn from_row(row: &RowView<'_>) -> Result<Self> {
                Ok(($(row.get_ordinal_as::<$ty>($ordinal)?,)+))
            }
        }
    };
}

from_row_tuple!(A => 0);
from_row_tuple!(A => 0, B => 1);
from_row_tuple!(A => 0, B => 1, C => 2);
from_row_tuple!(A => 0, B => 1, C => 2, D => 3);
