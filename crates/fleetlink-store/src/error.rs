//! Error types for the storage layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the authorization and settings store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No authorization entry or setting exists under the key.
    #[error("not found: {0}")]
    NotFound(String),

    /// The database was opened without a required column family.
    #[error("missing column family: {0}")]
    MissingColumnFamily(String),

    /// RocksDB reported an error.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be encoded or decoded as CBOR.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns true if the failure came from the database rather than the
    /// request, so repeating the operation later may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Database(err.into_string())
    }
}
