//! Password → salt → key derivation.
//!
//! Both functions are pure: identical inputs always produce identical
//! outputs, and nothing is cached or logged. Determinism is what lets any
//! password open *some* vault; there are no failed logins, only different
//! vaults.
//!
//! - Salt: `SHA-256(password)` truncated to 16 bytes. It is the vault's
//!   identity fingerprint.
//! - Key: `PBKDF2-HMAC-SHA256(password, salt)`, at least 200,000 iterations,
//!   32-byte output.

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::crypto::EncryptionKey;
use crate::error::CryptoError;

/// Length of a vault salt in bytes.
pub const SALT_LEN: usize = 16;

/// Lowest accepted PBKDF2 iteration count.
pub const MIN_ITERATIONS: u32 = 200_000;

/// Derived salt identifying a vault.
pub type Salt = [u8; SALT_LEN];

/// PBKDF2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
}

impl KdfParams {
    /// Parameters with the given iteration count.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if `iterations` is below
    /// [`MIN_ITERATIONS`].
    pub fn new(iterations: u32) -> Result<Self, CryptoError> {
        if iterations < MIN_ITERATIONS {
            return Err(CryptoError::KeyDerivation {
                reason: format!(
                    "{iterations} iterations is below the minimum of {MIN_ITERATIONS}"
                ),
            });
        }
        Ok(Self { iterations })
    }

    /// Cheap parameters for unit tests.
    #[cfg(test)]
    pub(crate) fn insecure(iterations: u32) -> Self {
        Self { iterations }
    }

    /// The PBKDF2 iteration count.
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
        }
    }
}

/// Derive the 16-byte identity salt of a password.
#[must_use]
pub fn derive_salt(password: &str) -> Salt {
    let digest = Sha256::digest(password.as_bytes());
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&digest[..SALT_LEN]);
    salt
}

/// Derive the 32-byte vault key from a password and its salt.
///
/// CPU-bound. Async callers should run it on a blocking worker.
#[must_use]
pub fn derive_key(password: &str, salt: &[u8], params: KdfParams) -> EncryptionKey {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iterations, &mut key);
    let derived = EncryptionKey::from_bytes(key);
    key.zeroize();
    derived
}
