//! Encrypted persistence for the scoresheet.
//! AES-256-CBC envelopes with a per-installation key kept in the OS keyring
//! (or test doubles), layered over any raw `KeyValueStore`.

pub mod encrypted_store;
pub mod envelope;
pub mod file_store;
pub mod key_provider;
