//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Authorization entries, keyed by credentials (public key).
    pub const AUTH_ENTRIES: &str = "auth_entries";

    /// Index: authorization entries by capability, keyed by
    /// `capability || 0x00 || credentials`.
    pub const AUTH_BY_CAPABILITY: &str = "auth_by_capability";

    /// Persisted router settings, keyed by setting name.
    pub const SETTINGS: &str = "settings";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::AUTH_ENTRIES, cf::AUTH_BY_CAPABILITY, cf::SETTINGS]
}
