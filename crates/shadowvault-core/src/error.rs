//! Error types for `shadowvault-core`.
//!
//! Each error variant carries enough context to diagnose the problem without
//! a debugger. Errors never include key material, passwords, or decrypted
//! credential values.

use shadowvault_storage::{StorageError, VaultId};

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption failed (wrong key, corrupted ciphertext, or tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// Ciphertext is too short to contain a valid nonce + tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// Key derivation was refused or could not run.
    #[error("key derivation failed: {reason}")]
    KeyDerivation { reason: String },
}

/// Errors surfaced by vault operations.
///
/// Authentication and lookup failures stay distinct so a caller can tell
/// "not logged in" from "wrong vault" from "no such entry".
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The session token is unknown or has expired.
    #[error("invalid session")]
    InvalidSession,

    /// The session is valid but bound to another vault.
    #[error("session is bound to vault {session_vault}, not vault {requested}")]
    VaultMismatch {
        session_vault: VaultId,
        requested: VaultId,
    },

    /// The vault has no entry for this service.
    #[error("no entry for service '{service}'")]
    EntryNotFound { service: String },

    /// A stored field did not decrypt under this vault's key.
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// A uniqueness constraint rejected a concurrent creation.
    ///
    /// Absorbed by the identity resolver; callers of the service never see it.
    #[error("constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    /// A non-decryption cryptographic failure.
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// The persistent store failed.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// An invariant could not be upheld.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decryption { .. } | CryptoError::CiphertextTooShort { .. } => {
                Self::Decryption {
                    reason: err.to_string(),
                }
            }
            CryptoError::Encryption { .. } | CryptoError::KeyDerivation { .. } => {
                Self::Crypto(err)
            }
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { constraint } => Self::ConstraintViolation { constraint },
            other => Self::Storage(other),
        }
    }
}
