//! Envelope codec for values at rest.
//!
//! Current format (written and read):
//! ```text
//! ENCv1:<iv as 32 hex chars>:<base64(AES-256-CBC-PKCS7(plaintext))>
//! ```
//! Legacy format (read only): the OpenSSL passphrase layout
//! `base64("Salted__" || salt[8] || ciphertext)`, whose base64 always starts
//! with `U2FsdGVkX1`. The passphrase is the hex form of the data key and the
//! AES key/IV come from `EVP_BytesToKey` (MD5, one round).

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use crate::key_provider::{KeyMaterial, KEY_LEN};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const ENVELOPE_PREFIX: &str = "ENCv1:";
pub const LEGACY_PREFIX: &str = "U2FsdGVkX1";

/// AES block / IV size in bytes.
pub const IV_LEN: usize = 16;

const LEGACY_MAGIC: &[u8] = b"Salted__";
const LEGACY_SALT_LEN: usize = 8;

/// How a raw stored value is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredFormat {
    Envelope,
    Legacy,
    Plaintext,
}

impl StoredFormat {
    pub fn detect(raw: &str) -> Self {
        if raw.starts_with(ENVELOPE_PREFIX) {
            StoredFormat::Envelope
        } else if raw.starts_with(LEGACY_PREFIX) {
            StoredFormat::Legacy
        } else {
            StoredFormat::Plaintext
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("missing envelope prefix")]
    MissingPrefix,
    #[error("missing separator between iv and ciphertext")]
    MissingSeparator,
    #[error("invalid iv: {0}")]
    InvalidIv(String),
    #[error("invalid base64: {0}")]
    InvalidBase64(String),
    #[error("missing legacy salt header")]
    MissingSaltHeader,
    #[error("decryption failed (wrong key or corrupted ciphertext)")]
    Decrypt,
    #[error("decrypted data is not valid UTF-8")]
    NotUtf8,
}

/// Encrypts `plaintext` under a fresh random IV.
pub fn seal(plaintext: &str, key: &KeyMaterial) -> String {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    seal_with_iv(plaintext, key, &iv)
}

fn seal_with_iv(plaintext: &str, key: &KeyMaterial, iv: &[u8; IV_LEN]) -> String {
    let ciphertext = Aes256CbcEnc::new(&(*key.bytes()).into(), &(*iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    format!(
        "{ENVELOPE_PREFIX}{}:{}",
        hex::encode(iv),
        STANDARD.encode(ciphertext)
    )
}

/// Decrypts a current-format envelope.
pub fn open(envelope: &str, key: &KeyMaterial) -> Result<String, EnvelopeError> {
    let body = envelope
        .strip_prefix(ENVELOPE_PREFIX)
        .ok_or(EnvelopeError::MissingPrefix)?;
    let (iv_hex, ciphertext_b64) = body
        .split_once(':')
        .ok_or(EnvelopeError::MissingSeparator)?;

    let iv_bytes = hex::decode(iv_hex).map_err(|e| EnvelopeError::InvalidIv(e.to_string()))?;
    let iv: [u8; IV_LEN] = iv_bytes.as_slice().try_into().map_err(|_| {
        EnvelopeError::InvalidIv(format!("expected {IV_LEN} bytes, got {}", iv_bytes.len()))
    })?;
    let ciphertext = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| EnvelopeError::InvalidBase64(e.to_string()))?;

    decrypt_cbc(key.bytes(), &iv, &ciphertext)
}

/// Decrypts a value written by the legacy passphrase scheme.
pub fn open_legacy(raw: &str, key: &KeyMaterial) -> Result<String, EnvelopeError> {
    let decoded = STANDARD
        .decode(raw.trim())
        .map_err(|e| EnvelopeError::InvalidBase64(e.to_string()))?;
    let rest = decoded
        .strip_prefix(LEGACY_MAGIC)
        .filter(|rest| rest.len() >= LEGACY_SALT_LEN)
        .ok_or(EnvelopeError::MissingSaltHeader)?;
    let (salt, ciphertext) = rest.split_at(LEGACY_SALT_LEN);

    let (derived_key, iv) = evp_bytes_to_key(key.to_hex().as_bytes(), salt);
    decrypt_cbc(&derived_key, &iv, ciphertext)
}

fn decrypt_cbc(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<String, EnvelopeError> {
    let plaintext = Aes256CbcDec::new(&(*key).into(), &(*iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| EnvelopeError::Decrypt)?;
    String::from_utf8(plaintext).map_err(|_| EnvelopeError::NotUtf8)
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut derived = Vec::with_capacity(KEY_LEN + IV_LEN + 16);
    let mut previous: Option<[u8; 16]> = None;

    while derived.len() < KEY_LEN + IV_LEN {
        let mut ctx = md5::Context::new();
        if let Some(block) = previous {
            ctx.consume(block);
        }
        ctx.consume(passphrase);
        ctx.consume(salt);
        let digest = ctx.compute();
        derived.extend_from_slice(&digest.0);
        previous = Some(digest.0);
    }

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&derived[..KEY_LEN]);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&derived[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}
