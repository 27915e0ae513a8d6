use async_trait::async_trait;
use scoresheet_core::storage::{KeyValueStore, StorageError};
use tracing::{debug, error, instrument, warn};

use crate::{
    envelope::{self, StoredFormat},
    key_provider::{KeyError, KeyMaterial, KeyProvider},
};

/// Transparent encryption over a raw `KeyValueStore`.
///
/// Reads accept three encodings: current envelopes, legacy passphrase
/// envelopes (read only, never rewritten) and plaintext written before
/// encryption existed, which is re-encrypted in place on first read.
/// Writes always produce a current envelope with a fresh IV.
pub struct EncryptedStorage<S: KeyValueStore, P: KeyProvider> {
    inner: S,
    key_provider: P,
}

impl<S: KeyValueStore, P: KeyProvider> EncryptedStorage<S, P> {
    pub fn new(inner: S, key_provider: P) -> Self {
        Self {
            inner,
            key_provider,
        }
    }

    /// The wrapped raw store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn key(&self) -> Result<KeyMaterial, StorageError> {
        self.key_provider.get_or_create().await.map_err(vault_err)
    }

    async fn migrate_plaintext(&self, key: &str, plaintext: &str) -> Result<(), StorageError> {
        let material = self.key().await?;
        let sealed = envelope::seal(plaintext, &material);
        self.inner.set_item(key, &sealed).await
    }
}

#[async_trait]
impl<S: KeyValueStore, P: KeyProvider> KeyValueStore for EncryptedStorage<S, P> {
    #[instrument(skip_all, fields(key = %key))]
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let raw = match self.inner.get_item(key).await? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };

        let opened = match StoredFormat::detect(&raw) {
            StoredFormat::Envelope => {
                let material = self.key().await?;
                envelope::open(&raw, &material)
            }
            StoredFormat::Legacy => {
                let material = self.key().await?;
                envelope::open_legacy(&raw, &material)
            }
            StoredFormat::Plaintext => {
                match self.migrate_plaintext(key, &raw).await {
                    Ok(()) => debug!("migrated plaintext value to encrypted envelope"),
                    Err(err) => warn!(error = %err, "plaintext value left unencrypted"),
                }
                return Ok(Some(raw));
            }
        };

        opened.map(Some).map_err(|err| {
            error!(error = %err, "failed to decrypt stored data");
            StorageError::Decrypt {
                key: key.to_string(),
                reason: err.to_string(),
            }
        })
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let material = self.key().await?;
        let sealed = envelope::seal(value, &material);
        self.inner.set_item(key, &sealed).await
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key).await
    }
}

fn vault_err(err: KeyError) -> StorageError {
    StorageError::Vault {
        reason: err.to_string(),
    }
}
