//! Field-level entry cipher.
//!
//! Provides AES-256-GCM authenticated encryption over a zeroize-on-drop key.
//! Each stored field (username, password, owner-secret digest) is encrypted
//! on its own, never as one record blob.
//!
//! # Security model
//!
//! - Every encryption generates a fresh 96-bit nonce via `OsRng`.
//! - Ciphertext format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - Ciphertext from one vault never authenticates under another vault's key.
//! - All key types derive `Zeroize` + `ZeroizeOnDrop`.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Minimum ciphertext length: 12-byte nonce + 16-byte AES-GCM tag.
const MIN_CIPHERTEXT_LEN: usize = 12 + 16;

/// Nonce length for AES-256-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// A 256-bit encryption key that is zeroized on drop.
///
/// The inner bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    ///
    /// Use with care: the caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The cipher of one unlocked vault.
///
/// Rebuilt from the freshly derived key on every authentication and held
/// only in memory (inside a session). Cloning copies the key; every copy is
/// zeroized when dropped.
#[derive(Clone, Debug)]
pub struct EntryCipher {
    key: EncryptionKey,
}

impl EntryCipher {
    /// Build a cipher around a derived key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypt one field with a fresh random nonce.
    ///
    /// Returns `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::Encryption {
                reason: e.to_string(),
            })?;

        let mut combined = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(combined)
    }

    /// Decrypt one field produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::CiphertextTooShort`] if the input is shorter
    /// than 28 bytes, or [`CryptoError::Decryption`] if authentication fails
    /// (different vault's key, corrupted data, or tampered tag).
    pub fn decrypt(&self, combined: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if combined.len() < MIN_CIPHERTEXT_LEN {
            return Err(CryptoError::CiphertextTooShort {
                expected: MIN_CIPHERTEXT_LEN,
                actual: combined.len(),
            });
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::Decryption {
                reason: e.to_string(),
            })
    }

    /// Decrypt a field that must hold UTF-8 text.
    ///
    /// # Errors
    ///
    /// Same as [`decrypt`](Self::decrypt); invalid UTF-8 is reported as
    /// [`CryptoError::Decryption`].
    pub fn decrypt_string(&self, combined: &[u8]) -> Result<String, CryptoError> {
        let plaintext = self.decrypt(combined)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption {
            reason: "plaintext is not valid UTF-8".to_owned(),
        })
    }
}
