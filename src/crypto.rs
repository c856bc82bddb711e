//! Credential sealing using AES-256-GCM
//!
//! Provider settings carry connection strings, passwords and service keys.
//! They are serialized to JSON and sealed before reaching the bootstrap
//! store, with additional authenticated data (AAD) binding each ciphertext
//! to its configuration ID and provider kind.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("sealed payload is not valid settings JSON: {0}")]
    Payload(String),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(CryptoKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// AAD binding sealed settings to one configuration and provider kind.
pub fn settings_aad(config_id: &str, provider: &str) -> Vec<u8> {
    format!("{config_id}|{provider}").into_bytes()
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // version || nonce || ciphertext+tag
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Serialize `value` as JSON and seal it.
pub fn seal_json<T: Serialize>(key: &CryptoKey, aad: &[u8], value: &T) -> Result<Vec<u8>, CryptoError> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(value).map_err(|e| CryptoError::Payload(e.to_string()))?,
    );
    encrypt_bytes(key, aad, &plaintext)
}

/// Open a payload produced by [`seal_json`].
pub fn open_json<T: DeserializeOwned>(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<T, CryptoError> {
    let plaintext = Zeroizing::new(decrypt_bytes(key, aad, ciphertext)?);
    serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Payload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).unwrap()
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn test_seal_and_open_settings() {
        let key = test_key();
        let aad = settings_aad("cfg-1", "postgres-managed");
        let settings = json!({"provider": "postgres-managed", "connection_string": "postgres://u:p@h/db"});

        let sealed = seal_json(&key, &aad, &settings).unwrap();
        assert_eq!(sealed[0], VERSION_ENCRYPTED);
        assert!(!String::from_utf8_lossy(&sealed).contains("postgres://"));

        let opened: serde_json::Value = open_json(&key, &aad, &sealed).unwrap();
        assert_eq!(opened, settings);
    }

    #[test]
    fn test_open_with_wrong_aad_fails() {
        let key = test_key();
        let sealed = seal_json(&key, &settings_aad("cfg-1", "postgres-managed"), &json!({})).unwrap();

        let result: Result<serde_json::Value, _> =
            open_json(&key, &settings_aad("cfg-2", "postgres-managed"), &sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_plaintext_payload_rejected() {
        let key = test_key();
        assert!(matches!(
            decrypt_bytes(&key, b"aad", b"{\"provider\":\"x\"}"),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[]),
            Err(CryptoError::EmptyCiphertext)
        ));
    }
}
