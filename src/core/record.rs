//! Declarative record types
//!
//! [`record!`](crate::record) declares a plain struct and generates its
//! [`FromRow`](crate::FromRow) and [`ToParameters`](crate::ToParameters)
//! implementations, so rows map onto fields (and fields onto parameters)
//! without hand-written column-by-column code.
//!
//! ```rust
//! use rust_db_access::record;
//! use uuid::Uuid;
//!
//! record! {
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub struct Person {
//!         pub id: i64 => "Id",
//!         pub name: String,
//!         pub email: Option<String>,
//!         pub external_id: Uuid,
//!     }
//! }
//! ```
//!
//! A field maps to the column of the same name unless an explicit column is
//! given after `=>`. Matching is case-insensitive. Columns with no matching
//! field are ignored; fields with no matching column keep their type's
//! `Default`, so every field type must implement `Default`.

/// Declare a record struct with generated row mapping and parameter binding
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty $(=> $column:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::FromRow for $name {
            fn from_row(row: &$crate::RowView<'_>) -> $crate::Result<Self> {
                Ok(Self {
                    $(
                        $field: {
                            let mut value = <$ty as ::std::default::Default>::default();
                            row.assign($crate::__record_column!($field $($column)?), &mut value)
                                .map_err(|e| e.for_field(stringify!($field)))?;
                            value
                        },
                    )*
                })
            }
        }

        impl $crate::ToParameters for $name {
            fn to_parameters(&self) -> $crate::Result<::std::vec::Vec<$crate::Parameter>> {
                Ok(::std::vec![
                    $(
                        $crate::Parameter::from_value(
                            $crate::__record_column!($field $($column)?),
                            &self.$field,
                        )?,
                    )*
                ])
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_column {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident $column:literal) => {
        $column
    };
}
