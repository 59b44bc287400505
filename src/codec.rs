//! Credential encryption for stored connection passwords.
//!
//! Passwords are sealed with AES-256-GCM under a process-wide key. The key is
//! taken from `DATAVIZ_ENCRYPTION_KEY`, else from the OS keyring, else it is
//! generated and saved to the keyring. Without a keyring the generated key only
//! lives as long as the process.

use crate::error::{DataVizError, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use keyring::Entry;
use tracing::{info, warn};

const SERVICE_NAME: &str = "dataviz";
const KEYRING_USER: &str = "encryption-key";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Environment variable holding a base64-encoded 32-byte key.
pub const KEY_ENV_VAR: &str = "DATAVIZ_ENCRYPTION_KEY";

/// Reversible transform applied to secrets before they reach the store.
pub trait CredentialCodec: Send + Sync {
    /// Encrypts a secret.
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>>;

    /// Decrypts a secret produced by `encrypt` under the same key.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String>;
}

/// Where the active key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Keyring,
    /// Generated for this process only; nothing persisted.
    Ephemeral,
}

/// A 256-bit symmetric key.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
    source: KeySource,
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl EncryptionKey {
    /// Resolves the process key: environment, then keyring, then a new key.
    pub fn resolve() -> Result<Self> {
        if let Ok(encoded) = std::env::var(KEY_ENV_VAR) {
            if !encoded.trim().is_empty() {
                return Self::from_base64(encoded.trim(), KeySource::Environment);
            }
        }

        let entry = Entry::new(SERVICE_NAME, KEYRING_USER).ok();

        if let Some(entry) = &entry {
            match entry.get_password() {
                Ok(encoded) => return Self::from_base64(&encoded, KeySource::Keyring),
                Err(keyring::Error::NoEntry) => {}
                Err(e) => warn!("Keyring unavailable for encryption key: {e}"),
            }
        }

        let generated = Self::generate();
        if let Some(entry) = &entry {
            if entry.set_password(&generated.to_base64()).is_ok() {
                info!("Generated a new encryption key and saved it to the OS keyring");
                return Ok(Self {
                    source: KeySource::Keyring,
                    ..generated
                });
            }
        }

        warn!(
            "No persistent encryption key available; stored passwords will be unreadable \
             after restart. Set {KEY_ENV_VAR} to keep them."
        );
        Ok(generated)
    }

    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(key.as_slice());
        Self {
            bytes,
            source: KeySource::Ephemeral,
        }
    }

    /// Builds a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes,
            source: KeySource::Ephemeral,
        }
    }

    fn from_base64(encoded: &str, source: KeySource) -> Result<Self> {
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| DataVizError::config(format!("Encryption key is not valid base64: {e}")))?;
        let bytes: [u8; KEY_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            DataVizError::config(format!(
                "Encryption key must be {KEY_LEN} bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self { bytes, source })
    }

    /// Encodes the key for storage in the environment or keyring.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

/// AES-256-GCM codec. Output layout: 12-byte nonce followed by the sealed text.
#[derive(Clone)]
pub struct AesGcmCodec {
    cipher: Aes256Gcm,
}

impl AesGcmCodec {
    pub fn new(key: &EncryptionKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key.bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }
}

impl CredentialCodec for AesGcmCodec {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| DataVizError::codec("Failed to encrypt secret"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        if ciphertext.len() < NONCE_LEN {
            return Err(DataVizError::codec("Ciphertext is truncated"));
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| {
                DataVizError::codec("Failed to decrypt secret; the encryption key may have changed")
            })?;
        String::from_utf8(plain).map_err(|e| DataVizError::codec(format!("Secret is not UTF-8: {e}")))
    }
}

/// Masks a secret for display, showing only the last 4 characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        "*".repeat(chars.len())
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> AesGcmCodec {
        AesGcmCodec::new(&EncryptionKey::from_bytes([7u8; KEY_LEN]))
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let codec = codec();
        let sealed = codec.encrypt("p@ss:w/rd").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"p@ss:w/rd");
        assert_eq!(codec.decrypt(&sealed).unwrap(), "p@ss:w/rd");
    }

    #[test]
    fn test_nonce_differs_per_call() {
        let codec = codec();
        let a = codec.encrypt("same").unwrap();
        let b = codec.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = codec().encrypt("secret").unwrap();
        let other = AesGcmCodec::new(&EncryptionKey::from_bytes([9u8; KEY_LEN]));
        let err = other.decrypt(&sealed).unwrap_err();
        assert!(matches!(err, DataVizError::Codec(_)));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        assert!(codec().decrypt(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_key_base64_round_trip() {
        let key = EncryptionKey::generate();
        let parsed = EncryptionKey::from_base64(&key.to_base64(), KeySource::Environment).unwrap();
        assert_eq!(parsed.bytes, key.bytes);
        assert_eq!(parsed.source(), KeySource::Environment);
    }

    #[test]
    fn test_short_key_rejected() {
        let err = EncryptionKey::from_base64(&STANDARD.encode([1u8; 16]), KeySource::Environment)
            .unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("sk-1234567890abcdef"), "****...cdef");
    }
}
