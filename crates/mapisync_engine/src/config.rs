//! Configuration for the sync engine.

use mapisync_codec::Locale;
use mapisync_core::TableKind;

/// Configuration shared by a session and the engines opened on it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Account name sent at logon.
    pub user: String,
    /// Client version string sent at logon.
    pub client_version: String,
    /// Values larger than this come back from a load as available-only.
    pub max_inline_size: u32,
    /// Re-authenticate and retry once when the session is lost.
    pub retry_on_session_expiry: bool,
    /// Send single-instance references instead of large bodies.
    pub single_instance: bool,
    /// Smallest body externalised as a single-instance reference.
    pub instance_threshold: usize,
    /// Collation locale for text comparison.
    pub locale: Locale,
    /// Rows fetched by a query when the caller gives no count.
    pub default_row_count: u32,
}

impl EngineConfig {
    /// Creates a configuration for `user`.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            client_version: concat!("mapisync/", env!("CARGO_PKG_VERSION")).to_string(),
            max_inline_size: 8 * 1024,
            retry_on_session_expiry: true,
            single_instance: true,
            instance_threshold: 64 * 1024,
            locale: Locale::invariant(),
            default_row_count: 50,
        }
    }

    /// Sets the inline size limit for loads.
    pub fn with_max_inline_size(mut self, bytes: u32) -> Self {
        self.max_inline_size = bytes;
        self
    }

    /// Enables or disables the session-expiry retry.
    pub fn with_session_retry(mut self, enabled: bool) -> Self {
        self.retry_on_session_expiry = enabled;
        self
    }

    /// Enables or disables single-instance references.
    pub fn with_single_instance(mut self, enabled: bool) -> Self {
        self.single_instance = enabled;
        self
    }

    /// Sets the single-instance threshold.
    pub fn with_instance_threshold(mut self, bytes: usize) -> Self {
        self.instance_threshold = bytes;
        self
    }

    /// Sets the comparison locale.
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Sets the default row count.
    pub fn with_default_row_count(mut self, rows: u32) -> Self {
        self.default_row_count = rows;
        self
    }

    /// Sets the client version string.
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Parameters for opening a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    /// Which table of the host object.
    pub kind: TableKind,
    /// Open flags passed to the server.
    pub open_flags: u32,
}

impl TableConfig {
    /// Creates a table configuration with no flags.
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            open_flags: 0,
        }
    }

    /// Sets the open flags.
    pub fn with_open_flags(mut self, flags: u32) -> Self {
        self.open_flags = flags;
        self
    }
}
