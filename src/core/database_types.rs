//! Built-in driver identifiers
//!
//! Profiles name their driver with a free-form identifier. The identifiers
//! understood out of the box, including the provider names used by older
//! configuration files, parse into [`DatabaseType`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Database types with a built-in driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    /// SQLite through rusqlite
    Sqlite,
    /// PostgreSQL through the synchronous postgres client
    Postgres,
}

impl DatabaseType {
    /// Canonical driver identifier
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Postgres => "postgres",
        }
    }

    /// Every identifier that resolves to this type (lowercase)
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            DatabaseType::Sqlite => &["sqlite", "sqlite3", "system.data.sqlite"],
            DatabaseType::Postgres => &["postgres", "postgresql", "npgsql"],
        }
    }

    /// Placeholders are matched by name rather than by position
    pub fn uses_named_placeholders(&self) -> bool {
        matches!(self, DatabaseType::Sqlite)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        [DatabaseType::Sqlite, DatabaseType::Postgres]
            .into_iter()
            .find(|t| t.aliases().contains(&needle.as_str()))
            .ok_or_else(|| format!("Invalid database type: '{}'", s))
    }
}
