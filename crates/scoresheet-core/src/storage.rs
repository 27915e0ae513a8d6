use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by key/value store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying storage failure (I/O, lock poisoning).
    #[error("storage failure: {reason}")]
    Storage { reason: String },
    /// The secure vault holding the encryption key could not be used.
    #[error("key vault unavailable: {reason}")]
    Vault { reason: String },
    /// A stored value exists but could not be decrypted (tampered data, wrong key).
    #[error("stored value for key {key} could not be decrypted: {reason}")]
    Decrypt { key: String, reason: String },
}

impl StorageError {
    /// True when the entry exists but holds no usable data.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, StorageError::Decrypt { .. })
    }
}

/// String key/value contract shared by the raw platform store and the encrypted adapter.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieve the value for a key, `None` when absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Persist a value under a key, overwriting any existing entry.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key and its value (idempotent).
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key).await
    }
}

/// Unencrypted in-memory store standing in for the platform key/value area.
/// Clones share the same entries, so tests can keep a handle on the raw
/// values underneath an encrypting wrapper.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyValueStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.inner.lock().map_err(|err| StorageError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_entries() {
        let store = InMemoryKeyValueStore::new();
        let handle = store.clone();

        store.set_item("k", "v").await.expect("set should succeed");
        assert_eq!(
            handle.get_item("k").await.expect("get should succeed"),
            Some("v".to_string())
        );
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_removes_data() {
        let store = InMemoryKeyValueStore::new();
        store.set_item("k", "v").await.expect("set should succeed");
        store.remove_item("k").await.expect("remove should succeed");
        store
            .remove_item("k")
            .await
            .expect("remove again should still succeed");

        assert_eq!(store.get_item("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn shared_handle_forwards_calls() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        store.set_item("k", "v").await.expect("set");
        assert_eq!(store.get_item("k").await.expect("get").as_deref(), Some("v"));
    }

    #[test]
    fn only_decrypt_errors_are_unreadable() {
        let decrypt = StorageError::Decrypt {
            key: "k".into(),
            reason: "bad padding".into(),
        };
        let io = StorageError::Storage {
            reason: "disk full".into(),
        };
        assert!(decrypt.is_unreadable());
        assert!(!io.is_unreadable());
    }
}
