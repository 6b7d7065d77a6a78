//! Real-vs-decoy role assignment and decoy mirroring.
//!
//! Runs exactly once per vault, inside the transaction that creates it. The
//! first vault ever created becomes the real one. Every later vault becomes
//! a decoy: it is mapped to the real vault and receives one fabricated entry
//! per service the real vault holds at that moment. Only service *names* are
//! read from the real vault; its credential values are never touched.
//!
//! The role row, the shadow row and every mirrored entry commit together or
//! not at all, so a crash can never leave a decoy with a partial service
//! list.

use shadowvault_storage::{NewEntry, StoreTransaction, VaultId, VaultRole};
use tracing::debug;

use crate::crypto::EntryCipher;
use crate::error::VaultError;
use crate::fabricate::CredentialFabricator;

/// Decides the role of a new vault and mirrors decoys.
#[derive(Debug)]
pub struct DeniabilityEngine {
    fabricator: CredentialFabricator,
}

impl DeniabilityEngine {
    /// An engine drawing decoy credentials from `fabricator`.
    #[must_use]
    pub fn new(fabricator: CredentialFabricator) -> Self {
        Self { fabricator }
    }

    /// Assign a role to the freshly inserted `vault_id` within `tx`.
    ///
    /// Fabricated fields are encrypted under `cipher`, the new vault's own
    /// key. The caller commits `tx`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ConstraintViolation`] if a concurrent creation claimed
    ///   the real role first.
    /// - [`VaultError::Crypto`] or [`VaultError::Storage`] on failure; the
    ///   caller must then drop `tx` so nothing is written.
    pub async fn assign_role(
        &self,
        tx: &mut dyn StoreTransaction,
        vault_id: VaultId,
        cipher: &EntryCipher,
    ) -> Result<VaultRole, VaultError> {
        let real_vault = tx.real_vault().await?;
        let role = match real_vault {
            None => {
                tx.insert_meta(vault_id, true).await?;
                VaultRole::Real
            }
            Some(real_vault_id) => {
                self.mirror(tx, vault_id, real_vault_id, cipher).await?;
                VaultRole::Decoy { real_vault_id }
            }
        };

        // One event, no counts: logs must not tell a real vault from a decoy.
        debug!(vault_id, "vault provisioned");

        Ok(role)
    }

    /// Write the decoy's role and shadow rows and one fabricated entry per
    /// service of the real vault.
    async fn mirror(
        &self,
        tx: &mut dyn StoreTransaction,
        vault_id: VaultId,
        real_vault_id: VaultId,
        cipher: &EntryCipher,
    ) -> Result<(), VaultError> {
        tx.insert_meta(vault_id, false).await?;
        tx.insert_shadow(real_vault_id, vault_id).await?;

        let services = tx.distinct_services(real_vault_id).await?;
        for service in &services {
            let fake = self.fabricator.fabricate(service);
            let entry = NewEntry {
                vault_id,
                service: service.clone(),
                username_cipher: cipher.encrypt(fake.username.as_bytes())?,
                password_cipher: cipher.encrypt(fake.password.as_bytes())?,
            };
            tx.insert_entry(&entry).await?;
        }
        Ok(())
    }
}
