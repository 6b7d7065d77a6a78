//! Transport-agnostic operation surface.
//!
//! [`VaultService`] wires the resolver, session store and owner verifier
//! together. Every operation except [`authenticate`](VaultService::authenticate)
//! is gated by session validation. Writes to one vault's entries are
//! serialized per vault; operations on different vaults run independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde::Serialize;
use shadowvault_storage::{NewEntry, VaultId, VaultStore};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::VaultConfig;
use crate::deniability::DeniabilityEngine;
use crate::error::VaultError;
use crate::fabricate::CredentialFabricator;
use crate::identity::IdentityResolver;
use crate::owner::OwnerSecretVerifier;
use crate::session::{Clock, SessionStore, SystemClock};

/// Result of [`VaultService::authenticate`].
#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub vault_id: VaultId,
    pub session_id: String,
}

/// Decrypted credentials of one entry.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Result of [`VaultService::verify_owner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OwnerVerification {
    pub is_real: bool,
}

/// The password manager.
pub struct VaultService {
    store: Arc<dyn VaultStore>,
    resolver: IdentityResolver,
    sessions: SessionStore,
    owner: OwnerSecretVerifier,
    vault_locks: StdMutex<HashMap<VaultId, Arc<Mutex<()>>>>,
}

impl VaultService {
    /// A service using the wall clock and an entropy-seeded fabricator.
    #[must_use]
    pub fn new(store: Arc<dyn VaultStore>, config: VaultConfig) -> Self {
        Self::with_parts(
            store,
            config,
            Arc::new(SystemClock),
            CredentialFabricator::from_entropy(),
        )
    }

    /// A service with an explicit clock and fabricator.
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn VaultStore>,
        config: VaultConfig,
        clock: Arc<dyn Clock>,
        fabricator: CredentialFabricator,
    ) -> Self {
        let resolver = IdentityResolver::new(
            Arc::clone(&store),
            DeniabilityEngine::new(fabricator),
            config.kdf,
        );
        let owner = OwnerSecretVerifier::new(Arc::clone(&store), config.decoy_owner_secret);
        Self {
            store,
            resolver,
            sessions: SessionStore::new(clock, config.session_ttl),
            owner,
            vault_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Open the vault of `password` (creating it on first use) and start a
    /// session bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Storage`], [`VaultError::Crypto`] or
    /// [`VaultError::Internal`] if the vault cannot be resolved. Any password
    /// is accepted; there is no "wrong password" error.
    pub async fn authenticate(&self, password: &str) -> Result<AuthOutcome, VaultError> {
        let resolved = self.resolver.resolve_or_create(password).await?;
        let session_id = self
            .sessions
            .create(resolved.vault_id, resolved.cipher)
            .await;
        Ok(AuthOutcome {
            vault_id: resolved.vault_id,
            session_id,
        })
    }

    /// Distinct service names of the vault, ascending.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidSession`], [`VaultError::VaultMismatch`], or
    /// [`VaultError::Storage`].
    pub async fn list_services(
        &self,
        session_id: &str,
        vault_id: VaultId,
    ) -> Result<Vec<String>, VaultError> {
        self.sessions.validate(session_id, vault_id).await?;
        Ok(self.store.list_services(vault_id).await?)
    }

    /// Store credentials for `service`, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidSession`], [`VaultError::VaultMismatch`],
    /// [`VaultError::Crypto`], or [`VaultError::Storage`].
    pub async fn add_entry(
        &self,
        session_id: &str,
        vault_id: VaultId,
        service: &str,
        username: &str,
        password: &str,
    ) -> Result<(), VaultError> {
        let cipher = self.sessions.validate(session_id, vault_id).await?;
        let entry = NewEntry {
            vault_id,
            service: service.to_owned(),
            username_cipher: cipher.encrypt(username.as_bytes())?,
            password_cipher: cipher.encrypt(password.as_bytes())?,
        };

        let lock = self.vault_lock(vault_id);
        let _guard = lock.lock().await;
        self.store.upsert_entry(&entry).await?;
        debug!(vault_id, "entry stored");
        Ok(())
    }

    /// Decrypt the credentials stored for `service`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::EntryNotFound`] if the vault has no such service.
    /// - [`VaultError::Decryption`] if a field does not decrypt under this
    ///   session's key.
    /// - [`VaultError::InvalidSession`], [`VaultError::VaultMismatch`], or
    ///   [`VaultError::Storage`].
    pub async fn read_entry(
        &self,
        session_id: &str,
        vault_id: VaultId,
        service: &str,
    ) -> Result<Credentials, VaultError> {
        let cipher = self.sessions.validate(session_id, vault_id).await?;
        let entry = self
            .store
            .find_entry(vault_id, service)
            .await?
            .ok_or_else(|| VaultError::EntryNotFound {
                service: service.to_owned(),
            })?;

        Ok(Credentials {
            username: cipher.decrypt_string(&entry.username_cipher)?,
            password: cipher.decrypt_string(&entry.password_cipher)?,
        })
    }

    /// Delete the entry for `service`. Deleting a missing entry succeeds.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidSession`], [`VaultError::VaultMismatch`], or
    /// [`VaultError::Storage`].
    pub async fn delete_entry(
        &self,
        session_id: &str,
        vault_id: VaultId,
        service: &str,
    ) -> Result<(), VaultError> {
        self.sessions.validate(session_id, vault_id).await?;

        let lock = self.vault_lock(vault_id);
        let _guard = lock.lock().await;
        let removed = self.store.delete_entry(vault_id, service).await?;
        debug!(vault_id, removed, "entry deleted");
        Ok(())
    }

    /// Set the owner secret of the session's vault.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidSession`], [`VaultError::VaultMismatch`],
    /// [`VaultError::Crypto`], or [`VaultError::Storage`].
    pub async fn set_owner_secret(
        &self,
        session_id: &str,
        vault_id: VaultId,
        secret: &str,
    ) -> Result<(), VaultError> {
        let cipher = self.sessions.validate(session_id, vault_id).await?;
        self.owner.set_owner_secret(vault_id, &cipher, secret).await
    }

    /// Check `secret` against the vault's owner secret.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidSession`], [`VaultError::VaultMismatch`],
    /// [`VaultError::Decryption`], or [`VaultError::Storage`].
    pub async fn verify_owner(
        &self,
        session_id: &str,
        vault_id: VaultId,
        secret: &str,
    ) -> Result<OwnerVerification, VaultError> {
        let cipher = self.sessions.validate(session_id, vault_id).await?;
        let is_real = self.owner.verify(vault_id, &cipher, secret).await?;
        Ok(OwnerVerification { is_real })
    }

    /// End a session. Unknown tokens are ignored.
    pub async fn logout(&self, session_id: &str) {
        self.sessions.revoke(session_id).await;
    }

    /// Drop every session and its key material.
    pub async fn shutdown(&self) {
        self.sessions.clear().await;
    }

    fn vault_lock(&self, vault_id: VaultId) -> Arc<Mutex<()>> {
        let mut locks = self
            .vault_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(vault_id).or_default())
    }
}

impl std::fmt::Debug for VaultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}
