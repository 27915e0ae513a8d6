use std::path::PathBuf;

use crate::config::{Config, APP_DIR};
use color_eyre::Result;
use dirs::data_dir;
use scoresheet_storage::{
    encrypted_store::EncryptedStorage,
    file_store::FileKeyValueStore,
    key_provider::{KeyringVault, VaultKeyProvider},
};
use tracing::debug;

#[cfg(test)]
use scoresheet_storage::key_provider::InMemoryVault;

/// Encrypted store used by the binary: files under the data dir, key in the OS keychain.
pub type AppStore = EncryptedStorage<FileKeyValueStore, VaultKeyProvider<KeyringVault>>;

/// Resolve the default data directory for the scoresheets.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join(APP_DIR))
}

/// Build the encrypted store, honouring config overrides.
pub fn store_from_config(config: &Config) -> Result<AppStore> {
    let root = match &config.data_dir {
        Some(root) => {
            debug!(?root, "initializing encrypted store (config override)");
            root.clone()
        }
        None => {
            let root = default_data_dir()?;
            debug!(?root, "initializing encrypted store");
            root
        }
    };

    Ok(EncryptedStorage::new(
        FileKeyValueStore::new(root),
        VaultKeyProvider::new(KeyringVault::new(config.keyring_service())),
    ))
}

/// Helper for tests to construct a store rooted at a temp dir with an in-memory vault.
#[cfg(test)]
pub fn test_store(
    root: impl Into<PathBuf>,
) -> EncryptedStorage<FileKeyValueStore, VaultKeyProvider<InMemoryVault>> {
    EncryptedStorage::new(
        FileKeyValueStore::new(root),
        VaultKeyProvider::new(InMemoryVault::new()),
    )
}
