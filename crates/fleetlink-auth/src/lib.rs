//! Capability authorization for fleetlink.
//!
//! Remote operations that hand out this platform's key or change its
//! management state are restricted to callers holding the `manager`
//! capability. This crate provides:
//!
//! - Public-key validation (43 character unpadded base64url, 32 bytes)
//! - The [`Authorizer`] trait evaluated per call
//! - A store-backed implementation that persists grants in `RocksDB`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │  PlatformService │────▶│   Authorizer     │
//! │  (manage, keys)  │     │   (trait)        │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │ StoreAuthorizer  │
//!                          │  (impl)          │
//!                          └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │   RocksStore     │
//!                          │   auth_entries   │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetlink_auth::{Authorizer, Caller, Capability, PublicKey, StoreAuthorizer};
//! use fleetlink_store::RocksStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/fleetlink-db")?);
//! let authorizer = StoreAuthorizer::new(store);
//!
//! let console_key = PublicKey::parse("q0hVUdaK6rl1ELNE4hOBtFnx9yZ5Ps1OgkrQAZ3m7Q4")?;
//! authorizer.grant(&console_key, "volttron.central", &Capability::Manager, "console")?;
//!
//! let caller = Caller::new("volttron.central", Some(console_key.as_str()));
//! authorizer.authorize(&caller, &Capability::Manager)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authorizer;
pub mod error;
pub mod key;

pub use authorizer::{Authorizer, Caller, Capability, StoreAuthorizer};
pub use error::{AuthError, Result};
pub use key::{PublicKey, PUBLIC_KEY_LEN};

#[cfg(any(test, feature = "test-utils"))]
pub use authorizer::MockAuthorizer;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(
            AuthError::InvalidPublicKey("x".into()).http_status_code(),
            400
        );
        assert_eq!(AuthError::MissingCredentials.http_status_code(), 401);
        assert_eq!(
            AuthError::Forbidden {
                identity: "a".into(),
                capability: "manager".into()
            }
            .http_status_code(),
            403
        );
    }

    #[test]
    fn auth_error_retriable() {
        assert!(!AuthError::MissingCredentials.is_retriable());
        assert!(AuthError::Store(fleetlink_store::StoreError::Database("busy".into()))
            .is_retriable());
    }
}
