//! `RocksDB` storage layer for fleetlink.
//!
//! This crate provides persistent storage for the authorization grants and
//! router settings of a platform instance using `RocksDB` with column
//! families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `auth_entries`: Authorization entries, keyed by credentials
//! - `auth_by_capability`: Index for listing entries by capability
//! - `settings`: Router settings, keyed by name
//!
//! # Example
//!
//! ```no_run
//! use fleetlink_store::{AuthEntry, RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/fleetlink-db").unwrap();
//!
//! // Grant the console's key the manager capability
//! let entry = AuthEntry::new("console-public-key", "volttron.central", ["manager"]);
//! store.upsert_auth_entry(&entry).unwrap();
//!
//! let managers = store.list_auth_by_capability("manager").unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{AuthEntry, Setting};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Authorization Operations
    // =========================================================================

    /// Insert an authorization entry, or merge its capabilities into the
    /// existing entry for the same credentials.
    ///
    /// This also maintains the capability index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn upsert_auth_entry(&self, entry: &AuthEntry) -> Result<AuthEntry>;

    /// Get the authorization entry for a public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_auth_entry(&self, credentials: &str) -> Result<Option<AuthEntry>>;

    /// Delete the authorization entry for a public key.
    ///
    /// This also removes the entry from the capability index.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no entry exists.
    fn delete_auth_entry(&self, credentials: &str) -> Result<()>;

    /// List all authorization entries granting a capability.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_auth_by_capability(&self, capability: &str) -> Result<Vec<AuthEntry>>;

    // =========================================================================
    // Setting Operations
    // =========================================================================

    /// Insert or update a setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_setting(&self, setting: &Setting) -> Result<()>;

    /// Get a setting by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_setting(&self, key: &str) -> Result<Option<Setting>>;

    /// Delete a setting by name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the setting doesn't exist.
    fn delete_setting(&self, key: &str) -> Result<()>;

    /// List all settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_settings(&self) -> Result<Vec<Setting>>;
}
