//! Vault identity resolver.
//!
//! Maps a password to a persistent vault, creating the vault the first time
//! its salt is seen. Creation is idempotent: the same password never yields
//! a second vault row, even when two callers race with it.
//!
//! Two layers keep creation single-writer. Within a process, creations are
//! serialized by an async lock. Across processes, the store's uniqueness
//! constraints (`vaults.salt`, the single-real-vault index) reject the
//! loser, whose transaction rolls back; the resolver then re-reads and
//! returns the winner's vault.

use std::sync::Arc;

use shadowvault_storage::{VaultId, VaultRole, VaultStore};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::EntryCipher;
use crate::deniability::DeniabilityEngine;
use crate::error::VaultError;
use crate::kdf::{self, KdfParams, Salt};

/// How many times a creation that lost a uniqueness race is retried.
const MAX_CREATE_ATTEMPTS: u32 = 3;

/// Outcome of resolving a password.
#[derive(Debug)]
pub struct ResolvedVault {
    pub vault_id: VaultId,
    /// Rebuilt from the freshly derived key; never persisted.
    pub cipher: EntryCipher,
    /// `Some` only when this call created the vault.
    pub created: Option<VaultRole>,
}

/// Looks up or creates the vault of a password.
pub struct IdentityResolver {
    store: Arc<dyn VaultStore>,
    engine: DeniabilityEngine,
    kdf: KdfParams,
    creation_lock: Mutex<()>,
}

impl IdentityResolver {
    /// A resolver over `store` that hands new vaults to `engine`.
    #[must_use]
    pub fn new(store: Arc<dyn VaultStore>, engine: DeniabilityEngine, kdf: KdfParams) -> Self {
        Self {
            store,
            engine,
            kdf,
            creation_lock: Mutex::new(()),
        }
    }

    /// Resolve `password` to its vault, creating it on first sight.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Storage`] or [`VaultError::Crypto`] if the lookup or
    ///   creation fails for reasons other than a lost race.
    /// - [`VaultError::Internal`] if key derivation could not run or
    ///   creation kept conflicting after retries.
    pub async fn resolve_or_create(&self, password: &str) -> Result<ResolvedVault, VaultError> {
        let (salt, cipher) = self.derive(password).await?;

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            if let Some(vault) = self.store.find_vault_by_salt(&salt).await? {
                return Ok(ResolvedVault {
                    vault_id: vault.id,
                    cipher,
                    created: None,
                });
            }

            match self.create(&salt, &cipher).await {
                Ok((vault_id, role)) => {
                    return Ok(ResolvedVault {
                        vault_id,
                        cipher,
                        created: Some(role),
                    });
                }
                Err(VaultError::ConstraintViolation { constraint }) => {
                    warn!(attempt, %constraint, "vault creation lost a race, retrying lookup");
                }
                Err(e) => return Err(e),
            }
        }

        Err(VaultError::Internal {
            reason: format!("vault creation conflicted {MAX_CREATE_ATTEMPTS} times"),
        })
    }

    /// Run the key derivation on a blocking worker.
    async fn derive(&self, password: &str) -> Result<(Salt, EntryCipher), VaultError> {
        let password = Zeroizing::new(password.to_owned());
        let params = self.kdf;
        tokio::task::spawn_blocking(move || {
            let salt = kdf::derive_salt(&password);
            let key = kdf::derive_key(&password, &salt, params);
            (salt, EntryCipher::new(key))
        })
        .await
        .map_err(|e| VaultError::Internal {
            reason: format!("key derivation task failed: {e}"),
        })
    }

    async fn create(
        &self,
        salt: &Salt,
        cipher: &EntryCipher,
    ) -> Result<(VaultId, VaultRole), VaultError> {
        let _guard = self.creation_lock.lock().await;

        let mut tx = self.store.begin().await?;
        let vault_id = tx.insert_vault(salt).await?;
        let role = self.engine.assign_role(tx.as_mut(), vault_id, cipher).await?;
        tx.commit().await?;

        debug!(vault_id, "vault created");
        Ok((vault_id, role))
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("engine", &self.engine)
            .field("kdf", &self.kdf)
            .finish_non_exhaustive()
    }
}
