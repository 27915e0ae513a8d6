//! Core contracts for the scoresheet: the string key/value store interface and
//! the typed match sheet payload.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod sheets;
pub mod storage;
