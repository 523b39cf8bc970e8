//! Connection handle
//!
//! A [`Connection`] wraps a native connection opened from a [`Profile`] (and
//! owned by the handle) or lent by the caller via
//! [`Connection::from_existing`]. Only owned connections are closed by the
//! handle, explicitly through [`Connection::close`] or on drop.

use super::command::CommandBuilder;
use super::config::{Profile, ProviderRegistry};
use super::driver::{resolve_driver, NativeConnection};
use super::error::{DatabaseError, ErrorKind, Result};
use super::transaction::Transaction;
use std::time::Duration;
use tracing::{info, warn};

enum NativeHandle<'a> {
    Owned(Box<dyn NativeConnection>),
    Borrowed(&'a mut dyn NativeConnection),
}

impl NativeHandle<'_> {
    fn get(&self) -> &dyn NativeConnection {
        match self {
            NativeHandle::Owned(native) => native.as_ref(),
            NativeHandle::Borrowed(native) => &**native,
        }
    }

    fn get_mut(&mut self) -> &mut dyn NativeConnection {
        match self {
            NativeHandle::Owned(native) => native.as_mut(),
            NativeHandle::Borrowed(native) => &mut **native,
        }
    }
}

/// Descriptive information about a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Profile the connection was opened from
    pub profile: Option<String>,
    /// Driver identifier
    pub driver: String,
    /// Default timeout for commands created from this connection
    pub command_timeout: Option<Duration>,
}

/// Handle to an open database connection
///
/// `Send` but not shared: use one handle per thread, or the
/// [`AsyncConnection`](super::async_connection::AsyncConnection) wrapper.
pub struct Connection<'a> {
    native: NativeHandle<'a>,
    info: ConnectionInfo,
    closed: bool,
}

impl Connection<'static> {
    /// Open a connection for `profile`
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Configuration`] for an unknown driver and
    /// [`DatabaseError::Connection`] if the driver cannot connect.
    pub fn open(profile: &Profile) -> Result<Self> {
        let driver = resolve_driver(&profile.driver)?;
        let native = driver.open(&profile.connection_string).map_err(|err| {
            if err.kind() == ErrorKind::Connection {
                err
            } else {
                DatabaseError::connection_with_source(
                    format!("failed to open profile '{}'", profile.name),
                    err,
                )
            }
        })?;
        info!(profile = %profile.name, driver = driver.name(), "connection opened");
        Ok(Self {
            native: NativeHandle::Owned(native),
            info: ConnectionInfo {
                profile: Some(profile.name.clone()),
                driver: driver.name().to_string(),
                command_timeout: None,
            },
            closed: false,
        })
    }

    /// Open the profile `name` from `registry`
    pub fn open_with(registry: &ProviderRegistry, name: &str) -> Result<Self> {
        Self::open(registry.resolve(name)?)
    }

    /// Open the profile `name` from the installed process-wide registry
    pub fn from_config(name: &str) -> Result<Self> {
        Self::open_with(ProviderRegistry::global()?, name)
    }
}

impl<'a> Connection<'a> {
    /// Wrap a native connection owned by the caller
    ///
    /// The handle never closes it.
    pub fn from_existing(native: &'a mut dyn NativeConnection) -> Self {
        let info = ConnectionInfo {
            profile: None,
            driver: native.driver_name().to_string(),
            command_timeout: None,
        };
        Self {
            native: NativeHandle::Borrowed(native),
            info,
            closed: false,
        }
    }

    /// Start a command
    ///
    /// On a closed handle the command fails with
    /// [`DatabaseError::InvalidOperation`] when executed.
    pub fn sql(&mut self, sql: impl Into<String>) -> CommandBuilder<'_> {
        if !self.is_open() {
            return CommandBuilder::closed(sql);
        }
        let timeout = self.info.command_timeout;
        CommandBuilder::new(self.native.get_mut(), sql, timeout)
    }

    /// Execute a statement without parameters
    pub fn execute(&mut self, sql: impl Into<String>) -> Result<u64> {
        self.sql(sql).as_non_query()
    }

    /// Begin a transaction
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidOperation`] if the handle is closed or
    /// the native connection is already inside a transaction.
    pub fn begin_transaction(&mut self) -> Result<Transaction<'_>> {
        if !self.is_open() {
            return Err(DatabaseError::invalid_operation(
                "cannot begin a transaction on a closed connection",
            ));
        }
        let timeout = self.info.command_timeout;
        let native = self.native.get_mut();
        if native.in_transaction() {
            return Err(DatabaseError::invalid_operation(
                "a transaction is already active on this connection",
            ));
        }
        Transaction::begin(native, timeout)
    }

    /// Default timeout for commands created afterwards
    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.info.command_timeout = timeout;
    }

    /// Close the handle
    ///
    /// Closes the native connection only when the handle owns it. Closing
    /// twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let NativeHandle::Owned(native) = &mut self.native {
            native.close()?;
            info!(profile = ?self.info.profile, driver = %self.info.driver, "connection closed");
        }
        Ok(())
    }

    /// True until closed
    pub fn is_open(&self) -> bool {
        !self.closed && !self.native.get().is_closed()
    }

    /// True if the handle closes the native connection
    pub fn is_owned(&self) -> bool {
        matches!(self.native, NativeHandle::Owned(_))
    }

    /// Connection information
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Profile name, if opened from a profile
    pub fn profile_name(&self) -> Option<&str> {
        self.info.profile.as_deref()
    }

    /// Driver identifier
    pub fn driver_name(&self) -> &str {
        &self.info.driver
    }
}

impl Drop for Connection<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, driver = %self.info.driver, "failed to close connection on drop");
        }
    }
}
