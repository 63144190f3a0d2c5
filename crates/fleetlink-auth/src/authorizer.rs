//! Capability checks and grants.

use std::sync::Arc;

use fleetlink_store::{AuthEntry, Store};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::key::PublicKey;

/// A named permission held by a public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// May administer this platform: fetch its key, manage it.
    Manager,
    /// Any other capability, by name.
    Other(String),
}

impl Capability {
    /// The name stored in authorization entries.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Manager => "manager",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verified sender of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Bus identity of the sender.
    pub identity: String,
    /// Public key the sender authenticated with, if any.
    pub public_key: Option<String>,
}

impl Caller {
    /// A caller with an identity and a key.
    #[must_use]
    pub fn new(identity: &str, public_key: Option<&str>) -> Self {
        Self {
            identity: identity.to_string(),
            public_key: public_key.map(ToString::to_string),
        }
    }
}

/// Decides whether callers hold capabilities, and records new grants.
pub trait Authorizer: Send + Sync {
    /// Check that `caller` holds `capability`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` if the caller has no key and
    /// `AuthError::Forbidden` if the key lacks the capability.
    fn authorize(&self, caller: &Caller, capability: &Capability) -> Result<()>;

    /// Grant `capability` to `key`, merging with existing grants.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be persisted.
    fn grant(
        &self,
        key: &PublicKey,
        user_id: &str,
        capability: &Capability,
        comments: &str,
    ) -> Result<()>;
}

/// An authorizer backed by the persistent auth store.
pub struct StoreAuthorizer<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StoreAuthorizer<S> {
    /// Create an authorizer over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: Store> Authorizer for StoreAuthorizer<S> {
    fn authorize(&self, caller: &Caller, capability: &Capability) -> Result<()> {
        let key = caller
            .public_key
            .as_deref()
            .ok_or(AuthError::MissingCredentials)?;

        let granted = self
            .store
            .get_auth_entry(key)?
            .is_some_and(|entry| entry.has_capability(capability.as_str()));

        if granted {
            Ok(())
        } else {
            tracing::warn!(
                identity = %caller.identity,
                capability = %capability,
                "Capability check failed"
            );
            Err(AuthError::Forbidden {
                identity: caller.identity.clone(),
                capability: capability.to_string(),
            })
        }
    }

    fn grant(
        &self,
        key: &PublicKey,
        user_id: &str,
        capability: &Capability,
        comments: &str,
    ) -> Result<()> {
        let entry = AuthEntry::new(key.as_str(), user_id, [capability.as_str()])
            .with_comments(comments);
        self.store.upsert_auth_entry(&entry)?;

        tracing::info!(user_id = %user_id, capability = %capability, "Capability granted");
        Ok(())
    }
}

/// An in-memory authorizer for testing.
///
/// Grants are kept in memory and checked exactly like the store-backed
/// implementation, except that `allow_all` short-circuits every check.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MockAuthorizer {
    /// Whether every capability check passes.
    pub allow_all: bool,
    grants: parking_lot::Mutex<Vec<(String, String, String)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockAuthorizer {
    /// An authorizer that allows every caller.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            allow_all: true,
            ..Self::default()
        }
    }

    /// Grants recorded so far as `(key, user_id, capability)`.
    #[must_use]
    pub fn grants(&self) -> Vec<(String, String, String)> {
        self.grants.lock().clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Authorizer for MockAuthorizer {
    fn authorize(&self, caller: &Caller, capability: &Capability) -> Result<()> {
        if self.allow_all {
            return Ok(());
        }
        let key = caller
            .public_key
            .as_deref()
            .ok_or(AuthError::MissingCredentials)?;
        let granted = self
            .grants
            .lock()
            .iter()
            .any(|(k, _, c)| k == key && c == capability.as_str());
        if granted {
            Ok(())
        } else {
            Err(AuthError::Forbidden {
                identity: caller.identity.clone(),
                capability: capability.to_string(),
            })
        }
    }

    fn grant(
        &self,
        key: &PublicKey,
        user_id: &str,
        capability: &Capability,
        _comments: &str,
    ) -> Result<()> {
        self.grants.lock().push((
            key.as_str().to_string(),
            user_id.to_string(),
            capability.as_str().to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;
    use fleetlink_store::RocksStore;
    use tempfile::TempDir;

    fn key(byte: u8) -> PublicKey {
        PublicKey::parse(&BASE64_URL_SAFE_NO_PAD.encode([byte; 32])).unwrap()
    }

    fn store_authorizer() -> (StoreAuthorizer<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (StoreAuthorizer::new(store), dir)
    }

    #[test]
    fn granted_key_is_authorized() {
        let (auth, _dir) = store_authorizer();
        let console = key(1);
        auth.grant(&console, "volttron.central", &Capability::Manager, "console")
            .unwrap();

        let caller = Caller::new("volttron.central", Some(console.as_str()));
        assert!(auth.authorize(&caller, &Capability::Manager).is_ok());
    }

    #[test]
    fn unknown_key_is_forbidden() {
        let (auth, _dir) = store_authorizer();
        let caller = Caller::new("someone", Some(key(2).as_str()));
        assert!(matches!(
            auth.authorize(&caller, &Capability::Manager),
            Err(AuthError::Forbidden { .. })
        ));
    }

    #[test]
    fn caller_without_key_is_rejected() {
        let (auth, _dir) = store_authorizer();
        let caller = Caller::new("anonymous", None);
        assert!(matches!(
            auth.authorize(&caller, &Capability::Manager),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn other_capability_does_not_imply_manager() {
        let (auth, _dir) = store_authorizer();
        let k = key(3);
        auth.grant(&k, "reader", &Capability::Other("read".into()), "")
            .unwrap();
        let caller = Caller::new("reader", Some(k.as_str()));
        assert!(auth
            .authorize(&caller, &Capability::Other("read".into()))
            .is_ok());
        assert!(auth.authorize(&caller, &Capability::Manager).is_err());
    }

    #[test]
    fn mock_records_grants() {
        let auth = MockAuthorizer::default();
        let k = key(4);
        auth.grant(&k, "volttron.central", &Capability::Manager, "")
            .unwrap();
        assert_eq!(auth.grants().len(), 1);
        assert!(auth
            .authorize(&Caller::new("vc", Some(k.as_str())), &Capability::Manager)
            .is_ok());
    }
}
