//! Core library for `ShadowVault`.
//!
//! A password manager with plausible deniability. Every password opens a
//! vault: the first one ever used opens the real vault, every other one
//! opens a decoy that mirrors the real vault's service names with
//! fabricated credentials. Entry fields are encrypted with AES-256-GCM under
//! a PBKDF2-derived key that is never persisted; it lives only in the
//! in-memory session store for the session's lifetime.
//!
//! This crate depends on `shadowvault-storage` for the [`VaultStore`]
//! contract and knows nothing about a specific database.
//!
//! [`VaultStore`]: shadowvault_storage::VaultStore

pub mod config;
pub mod crypto;
pub mod deniability;
pub mod error;
pub mod fabricate;
pub mod identity;
pub mod kdf;
pub mod owner;
pub mod service;
pub mod session;

#[cfg(test)]
mod test_support;

pub use config::{DecoyOwnerSecretPolicy, VaultConfig};
pub use error::{CryptoError, VaultError};
pub use service::{AuthOutcome, Credentials, OwnerVerification, VaultService};
