use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, info};

/// Vault entry holding the hex-encoded data key.
pub const ENCRYPTION_KEY_ENTRY: &str = "fsgt_encryption_key";

/// Key size in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Key material used for encryption at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    id: String,
    bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Identifier for logging (the vault entry name, never the key bytes).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Lowercase hex form, as persisted in the vault. The legacy envelope
    /// format uses this string as its passphrase.
    pub(crate) fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub(crate) fn from_hex(id: impl Into<String>, secret: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(secret.trim()).map_err(|e| KeyError::Decode(e.to_string()))?;
        if bytes.len() != KEY_LEN {
            return Err(KeyError::Decode(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut out = [0u8; KEY_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self {
            id: id.into(),
            bytes: out,
        })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("vault error: {0}")]
    Vault(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Platform credential area holding small secrets outside the regular store.
#[async_trait]
pub trait SecureVault: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, KeyError>;
    async fn set_secret(&self, name: &str, value: &str) -> Result<(), KeyError>;
}

/// OS keyring-backed vault. Uses the `keyring` crate, one entry per secret name.
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, KeyError> {
        keyring::Entry::new(&self.service, name).map_err(|e| KeyError::Vault(e.to_string()))
    }
}

#[async_trait]
impl SecureVault for KeyringVault {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, KeyError> {
        // Keyring operations are synchronous; wrap in async for trait compatibility.
        match self.entry(name)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(KeyError::Vault(err.to_string())),
        }
    }

    async fn set_secret(&self, name: &str, value: &str) -> Result<(), KeyError> {
        self.entry(name)?
            .set_password(value)
            .map_err(|e| KeyError::Vault(e.to_string()))
    }
}

/// In-memory vault for tests and ephemeral sessions. Clones share entries.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVault {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, KeyError> {
        self.inner
            .lock()
            .map_err(|err| KeyError::Vault(format!("lock poisoned: {err}")))
    }
}

#[async_trait]
impl SecureVault for InMemoryVault {
    async fn get_secret(&self, name: &str) -> Result<Option<String>, KeyError> {
        Ok(self.lock()?.get(name).cloned())
    }

    async fn set_secret(&self, name: &str, value: &str) -> Result<(), KeyError> {
        self.lock()?.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// Provides access to the data key (vault-backed in production and tests alike).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Fetches the data key from a `SecureVault`, creating and persisting it on
/// first use. The material is cached for the lifetime of the provider.
pub struct VaultKeyProvider<V: SecureVault> {
    vault: V,
    entry: String,
    cached: Mutex<Option<KeyMaterial>>,
}

impl<V: SecureVault> VaultKeyProvider<V> {
    pub fn new(vault: V) -> Self {
        Self::with_entry(vault, ENCRYPTION_KEY_ENTRY)
    }

    pub fn with_entry(vault: V, entry: impl Into<String>) -> Self {
        Self {
            vault,
            entry: entry.into(),
            cached: Mutex::new(None),
        }
    }

    fn cached(&self) -> Result<Option<KeyMaterial>, KeyError> {
        self.cached
            .lock()
            .map(|guard| guard.clone())
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))
    }

    fn remember(&self, material: &KeyMaterial) -> Result<(), KeyError> {
        let mut guard = self
            .cached
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;
        *guard = Some(material.clone());
        Ok(())
    }
}

#[async_trait]
impl<V: SecureVault> KeyProvider for VaultKeyProvider<V> {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        if let Some(existing) = self.cached()? {
            return Ok(existing);
        }

        let material = match self.vault.get_secret(&self.entry).await? {
            Some(secret) => {
                debug!(entry = %self.entry, "loaded data key from vault");
                KeyMaterial::from_hex(&self.entry, &secret)?
            }
            None => {
                let material = generate_key(&self.entry);
                self.vault
                    .set_secret(&self.entry, &material.to_hex())
                    .await?;
                info!(entry = %self.entry, "generated new data key");
                material
            }
        };

        self.remember(&material)?;
        Ok(material)
    }
}

fn generate_key(id: &str) -> KeyMaterial {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: id.to_string(),
        bytes,
    }
}
