//! AES-256-GCM vault backed by a key file
//!
//! Ciphertext layout: `b"CKV1" || nonce (12 bytes) || ciphertext + tag`.

use crate::error::{Error, Result, read_file};
use crate::security::create_secret_file;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use log::{debug, info};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Frame marker for vault ciphertext
pub const MAGIC: &[u8; 4] = b"CKV1";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Holds one symmetric key and encrypts/decrypts byte payloads
///
/// [`encrypt`](Self::encrypt) and [`decrypt`](Self::decrypt) pass bytes
/// through unchanged while the vault is disabled. [`seal`](Self::seal) and
/// [`open`](Self::open) always use the key; they serve payloads whose
/// encryption state is recorded elsewhere (e.g. in a backup manifest).
pub struct CryptoVault {
    cipher: Option<Aes256Gcm>,
    key_file: Option<PathBuf>,
    enabled: AtomicBool,
}

impl std::fmt::Debug for CryptoVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoVault")
            .field("key_file", &self.key_file)
            .field("has_key", &self.cipher.is_some())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl CryptoVault {
    /// Load the key from `key_file`, generating and persisting one if the
    /// file does not exist and `enabled` is set
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if an existing key file has the wrong length;
    /// the key is never regenerated in that case.
    pub fn load_or_create(key_file: &Path, enabled: bool) -> Result<Self> {
        let cipher = if key_file.exists() {
            let bytes = read_file(key_file)?;
            debug!("Loaded encryption key from {}", key_file.display());
            Some(cipher_from_slice(&bytes)?)
        } else if enabled {
            let key: [u8; KEY_LEN] = rand::rng().random();
            create_secret_file(key_file, &key)?;
            info!("Generated new encryption key at {}", key_file.display());
            Some(cipher_from_slice(&key)?)
        } else {
            None
        };

        Ok(Self {
            cipher,
            key_file: Some(key_file.to_path_buf()),
            enabled: AtomicBool::new(enabled),
        })
    }

    /// Vault over an in-memory key
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if `key` is not 32 bytes.
    pub fn from_key(key: &[u8], enabled: bool) -> Result<Self> {
        Ok(Self {
            cipher: Some(cipher_from_slice(key)?),
            key_file: None,
            enabled: AtomicBool::new(enabled),
        })
    }

    /// Vault without a key; every operation passes through
    pub fn disabled() -> Self {
        Self {
            cipher: None,
            key_file: None,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire) && self.cipher.is_some()
    }

    pub fn has_key(&self) -> bool {
        self.cipher.is_some()
    }

    /// Toggle encryption, e.g. after `security.data_privacy.encryption_enabled`
    /// changes; without a key this stays disabled
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    /// Encrypt if enabled, otherwise return the input unchanged
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.is_enabled() {
            self.seal(plaintext)
        } else {
            Ok(plaintext.to_vec())
        }
    }

    /// Decrypt if enabled, otherwise return the input unchanged
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] on bad framing or authentication failure.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if self.is_enabled() {
            self.open(data)
        } else {
            Ok(data.to_vec())
        }
    }

    /// Encrypt unconditionally
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if the vault has no key.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;
        let nonce_bytes: [u8; NONCE_LEN] = rand::rng().random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::Crypto(format!("Encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt unconditionally
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if the vault has no key, the frame is
    /// malformed or the payload fails authentication.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;

        let body = data
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| Error::Crypto("Missing vault header".into()))?;
        if body.len() < NONCE_LEN {
            return Err(Error::Crypto("Truncated ciphertext".into()));
        }
        let (nonce_bytes, ciphertext) = body.split_at(NONCE_LEN);

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::Crypto("Decryption failed (wrong key or corrupted data)".into()))
    }

    fn cipher(&self) -> Result<&Aes256Gcm> {
        self.cipher
            .as_ref()
            .ok_or_else(|| Error::Crypto("No encryption key available".into()))
    }
}

fn cipher_from_slice(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(Error::Crypto(format!(
            "Invalid key length: expected {KEY_LEN} bytes, found {}",
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| Error::Crypto("Invalid key length".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_encrypt_decrypt() {
        let vault = CryptoVault::from_key(&[7u8; 32], true).unwrap();
        let sealed = vault.encrypt(b"{\"theme\":\"dark\"}").unwrap();

        assert!(sealed.starts_with(MAGIC));
        assert_ne!(&sealed[16..], b"{\"theme\":\"dark\"}");
        assert_eq!(vault.decrypt(&sealed).unwrap(), b"{\"theme\":\"dark\"}");
    }

    #[test]
    fn test_nonce_differs_per_call() {
        let vault = CryptoVault::from_key(&[7u8; 32], true).unwrap();
        assert_ne!(vault.seal(b"same").unwrap(), vault.seal(b"same").unwrap());
    }

    #[test]
    fn test_disabled_passes_through() {
        let vault = CryptoVault::from_key(&[7u8; 32], false).unwrap();
        assert!(!vault.is_enabled());
        assert_eq!(vault.encrypt(b"plain").unwrap(), b"plain");
        assert_eq!(vault.decrypt(b"plain").unwrap(), b"plain");

        let keyless = CryptoVault::disabled();
        assert!(keyless.seal(b"x").is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let vault = CryptoVault::from_key(&[1u8; 32], true).unwrap();
        let mut sealed = vault.seal(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;

        let err = vault.open(&sealed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crypto);
        assert!(vault.open(b"nope").is_err());
        assert!(vault.open(b"CKV1short").is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = CryptoVault::from_key(&[1u8; 32], true).unwrap();
        let b = CryptoVault::from_key(&[2u8; 32], true).unwrap();
        assert!(b.open(&a.seal(b"secret").unwrap()).is_err());
    }

    #[test]
    fn test_key_file_persisted_and_reused() {
        let dir = tempdir().unwrap();
        let key_file = dir.path().join("security/encryption.key");

        let first = CryptoVault::load_or_create(&key_file, true).unwrap();
        assert_eq!(std::fs::read(&key_file).unwrap().len(), 32);
        let sealed = first.seal(b"hello").unwrap();

        let second = CryptoVault::load_or_create(&key_file, true).unwrap();
        assert_eq!(second.open(&sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_disabled_without_key_file_creates_nothing() {
        let dir = tempdir().unwrap();
        let key_file = dir.path().join("encryption.key");

        let vault = CryptoVault::load_or_create(&key_file, false).unwrap();
        assert!(!vault.has_key());
        assert!(!key_file.exists());
    }

    #[test]
    fn test_wrong_length_key_file_is_error() {
        let dir = tempdir().unwrap();
        let key_file = dir.path().join("encryption.key");
        std::fs::write(&key_file, b"too short").unwrap();

        let err = CryptoVault::load_or_create(&key_file, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crypto);
        assert_eq!(std::fs::read(&key_file).unwrap(), b"too short");
    }
}
