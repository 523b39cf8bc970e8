//! Connection profiles
//!
//! A [`Profile`] names a driver and a connection string. Profiles are
//! collected in a [`ProviderRegistry`], usually loaded once at startup from a
//! JSON profile table and installed as the process-wide registry:
//!
//! ```json
//! {
//!   "profiles": [
//!     { "name": "sqlite", "driver": "System.Data.SQLite", "connection_string": "Data Source=app.db" },
//!     { "name": "main", "driver": "postgres", "connection_string": "host=localhost user=app" }
//!   ]
//! }
//! ```

use super::error::{DatabaseError, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

static GLOBAL_REGISTRY: OnceCell<ProviderRegistry> = OnceCell::new();

/// Named connection profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name, matched case-insensitively
    pub name: String,
    /// Driver identifier (`sqlite`, `postgres`, or a registered custom driver)
    pub driver: String,
    /// Driver-specific connection string
    pub connection_string: String,
}

impl Profile {
    /// Create a profile
    pub fn new(
        name: impl Into<String>,
        driver: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            connection_string: connection_string.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileTable {
    profiles: Vec<Profile>,
}

/// Lookup table from profile name to [`Profile`]
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    profiles: HashMap<String, Profile>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile, replacing one registered under the same name
    pub fn register(&mut self, profile: Profile) -> &mut Self {
        self.profiles.insert(profile.name.to_lowercase(), profile);
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.register(profile);
        self
    }

    /// Resolve a profile by name
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] if no profile has that name.
    pub fn resolve(&self, name: &str) -> Result<&Profile> {
        self.profiles.get(&name.to_lowercase()).ok_or_else(|| {
            DatabaseError::configuration(format!("no connection profile named '{}'", name))
        })
    }

    /// Registered profile names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.values().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Load a registry from a JSON profile table
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the JSON is malformed or a profile has
    /// an empty name or driver.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let table: ProfileTable = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for profile in table.profiles {
            if profile.name.trim().is_empty() || profile.driver.trim().is_empty() {
                return Err(DatabaseError::configuration(format!(
                    "profile {:?} needs both a name and a driver",
                    profile.name
                )));
            }
            registry.register(profile);
        }
        Ok(registry)
    }

    /// Load a registry from a JSON profile table on disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Install `self` as the process-wide registry
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] if a registry is already
    /// installed; profiles are read-only once loaded.
    pub fn install(self) -> Result<&'static ProviderRegistry> {
        GLOBAL_REGISTRY.set(self).map_err(|_| {
            DatabaseError::configuration("a provider registry is already installed")
        })?;
        Self::global()
    }

    /// The process-wide registry
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] before [`install`](Self::install).
    pub fn global() -> Result<&'static ProviderRegistry> {
        GLOBAL_REGISTRY
            .get()
            .ok_or_else(|| DatabaseError::configuration("no provider registry installed"))
    }
}
