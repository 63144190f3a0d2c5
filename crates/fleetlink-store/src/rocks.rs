//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{AuthEntry, Setting};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::MissingColumnFamily(name.to_string()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Authorization Operations
    // =========================================================================

    fn upsert_auth_entry(&self, entry: &AuthEntry) -> Result<AuthEntry> {
        let cf_entries = self.cf(cf::AUTH_ENTRIES)?;
        let cf_by_capability = self.cf(cf::AUTH_BY_CAPABILITY)?;

        let merged = match self.get_auth_entry(&entry.credentials)? {
            Some(mut existing) => {
                existing
                    .capabilities
                    .extend(entry.capabilities.iter().cloned());
                existing.user_id.clone_from(&entry.user_id);
                if entry.comments.is_some() {
                    existing.comments.clone_from(&entry.comments);
                }
                existing.updated_at = Utc::now();
                existing
            }
            None => entry.clone(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_entries,
            keys::auth_key(&merged.credentials),
            Self::serialize(&merged)?,
        );
        // Capabilities only grow on upsert, so the index never needs a delete here
        for capability in &merged.capabilities {
            batch.put_cf(
                &cf_by_capability,
                keys::capability_key(capability, &merged.credentials),
                [],
            );
        }

        self.db.write(batch)?;

        tracing::debug!(
            user_id = %merged.user_id,
            capabilities = ?merged.capabilities,
            "Authorization entry stored"
        );
        Ok(merged)
    }

    fn get_auth_entry(&self, credentials: &str) -> Result<Option<AuthEntry>> {
        let cf = self.cf(cf::AUTH_ENTRIES)?;

        self.db
            .get_cf(&cf, keys::auth_key(credentials))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete_auth_entry(&self, credentials: &str) -> Result<()> {
        let cf_entries = self.cf(cf::AUTH_ENTRIES)?;
        let cf_by_capability = self.cf(cf::AUTH_BY_CAPABILITY)?;

        let entry = self
            .get_auth_entry(credentials)?
            .ok_or_else(|| StoreError::NotFound(credentials.to_string()))?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_entries, keys::auth_key(credentials));
        for capability in &entry.capabilities {
            batch.delete_cf(
                &cf_by_capability,
                keys::capability_key(capability, credentials),
            );
        }

        self.db.write(batch)?;

        Ok(())
    }

    fn list_auth_by_capability(&self, capability: &str) -> Result<Vec<AuthEntry>> {
        let cf_by_capability = self.cf(cf::AUTH_BY_CAPABILITY)?;
        let prefix = keys::capability_prefix(capability);

        let mut entries = Vec::new();
        let iter = self.db.iterator_cf(
            &cf_by_capability,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, _) = item?;

            // Stop if we're past the prefix
            if !key.starts_with(&prefix) {
                break;
            }

            let Some(credentials) = keys::extract_credentials_from_capability_key(&key) else {
                continue;
            };
            if let Some(entry) = self.get_auth_entry(&credentials)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    // =========================================================================
    // Setting Operations
    // =========================================================================

    fn put_setting(&self, setting: &Setting) -> Result<()> {
        let cf = self.cf(cf::SETTINGS)?;

        self.db
            .put_cf(&cf, keys::setting_key(&setting.key), Self::serialize(setting)?)?;
        Ok(())
    }

    fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let cf = self.cf(cf::SETTINGS)?;

        self.db
            .get_cf(&cf, keys::setting_key(key))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete_setting(&self, key: &str) -> Result<()> {
        let cf = self.cf(cf::SETTINGS)?;

        if self.get_setting(key)?.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }

        self.db.delete_cf(&cf, keys::setting_key(key))?;
        Ok(())
    }

    fn list_settings(&self) -> Result<Vec<Setting>> {
        let cf = self.cf(cf::SETTINGS)?;

        let mut settings = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            settings.push(Self::deserialize(&value)?);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn auth_entry_crud() {
        let (store, _dir) = create_test_store();
        let entry = AuthEntry::new("key-a", "volttron.central", ["manager"]);

        store.upsert_auth_entry(&entry).unwrap();

        let retrieved = store.get_auth_entry("key-a").unwrap().unwrap();
        assert!(retrieved.has_capability("manager"));
        assert_eq!(retrieved.user_id, "volttron.central");

        store.delete_auth_entry("key-a").unwrap();
        assert!(store.get_auth_entry("key-a").unwrap().is_none());
        assert!(store.list_auth_by_capability("manager").unwrap().is_empty());
    }

    #[test]
    fn upsert_merges_capabilities() {
        let (store, _dir) = create_test_store();
        store
            .upsert_auth_entry(&AuthEntry::new("key-a", "console", ["reader"]))
            .unwrap();
        let merged = store
            .upsert_auth_entry(
                &AuthEntry::new("key-a", "console", ["manager"]).with_comments("registered"),
            )
            .unwrap();

        assert!(merged.has_capability("reader"));
        assert!(merged.has_capability("manager"));
        assert_eq!(merged.comments.as_deref(), Some("registered"));
        assert!(merged.updated_at >= merged.created_at);
    }

    #[test]
    fn list_auth_by_capability() {
        let (store, _dir) = create_test_store();
        store
            .upsert_auth_entry(&AuthEntry::new("key-a", "a", ["manager"]))
            .unwrap();
        store
            .upsert_auth_entry(&AuthEntry::new("key-b", "b", ["manager2"]))
            .unwrap();
        store
            .upsert_auth_entry(&AuthEntry::new("key-c", "c", ["manager", "reader"]))
            .unwrap();

        let managers = store.list_auth_by_capability("manager").unwrap();
        let mut creds: Vec<_> = managers.iter().map(|e| e.credentials.as_str()).collect();
        creds.sort_unstable();
        assert_eq!(creds, vec!["key-a", "key-c"]);
    }

    #[test]
    fn delete_missing_auth_entry_is_not_found() {
        let (store, _dir) = create_test_store();
        assert!(matches!(
            store.delete_auth_entry("nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn settings_crud() {
        let (store, _dir) = create_test_store();
        store
            .put_setting(&Setting::new("poll", json!({"interval": 30, "enabled": true})))
            .unwrap();
        store.put_setting(&Setting::new("name", json!("bldg-1"))).unwrap();

        let poll = store.get_setting("poll").unwrap().unwrap();
        assert_eq!(poll.value, json!({"interval": 30, "enabled": true}));

        store.put_setting(&Setting::new("name", json!("bldg-2"))).unwrap();
        assert_eq!(
            store.get_setting("name").unwrap().unwrap().value,
            json!("bldg-2")
        );
        assert_eq!(store.list_settings().unwrap().len(), 2);

        store.delete_setting("poll").unwrap();
        assert!(store.get_setting("poll").unwrap().is_none());
        assert!(matches!(
            store.delete_setting("poll"),
            Err(StoreError::NotFound(_))
        ));
    }
}
