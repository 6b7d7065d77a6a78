//! Owner-secret proof.
//!
//! A second factor, independent of the vault password, that lets the true
//! owner show a vault is authentic. The stored value is the hex SHA-256
//! digest of the secret, encrypted under the vault's own key. No stored
//! digest means "not provably real", never an error.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use shadowvault_storage::{VaultId, VaultRole, VaultStore};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::DecoyOwnerSecretPolicy;
use crate::crypto::EntryCipher;
use crate::error::VaultError;

/// Sets and checks owner secrets.
pub struct OwnerSecretVerifier {
    store: Arc<dyn VaultStore>,
    decoy_policy: DecoyOwnerSecretPolicy,
}

impl OwnerSecretVerifier {
    #[must_use]
    pub fn new(store: Arc<dyn VaultStore>, decoy_policy: DecoyOwnerSecretPolicy) -> Self {
        Self {
            store,
            decoy_policy,
        }
    }

    /// Store the encrypted digest of `secret` for `vault_id`, replacing any
    /// previous one.
    ///
    /// Under [`DecoyOwnerSecretPolicy::Ignore`] a write to a decoy is
    /// acknowledged without storing anything.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] or [`VaultError::Storage`] on failure.
    pub async fn set_owner_secret(
        &self,
        vault_id: VaultId,
        cipher: &EntryCipher,
        secret: &str,
    ) -> Result<(), VaultError> {
        if self.decoy_policy == DecoyOwnerSecretPolicy::Ignore
            && matches!(
                self.store.vault_role(vault_id).await?,
                Some(VaultRole::Decoy { .. })
            )
        {
            return Ok(());
        }

        let digest = secret_digest(secret);
        let encrypted = cipher.encrypt(digest.as_bytes())?;
        self.store.set_owner_secret(vault_id, &encrypted).await?;

        debug!(vault_id, "owner secret set");
        Ok(())
    }

    /// Whether `candidate` matches the stored owner secret.
    ///
    /// Returns `false` when no secret was ever set.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Decryption`] if the stored digest does not decrypt
    ///   under `cipher`.
    /// - [`VaultError::Storage`] if the store fails.
    pub async fn verify(
        &self,
        vault_id: VaultId,
        cipher: &EntryCipher,
        candidate: &str,
    ) -> Result<bool, VaultError> {
        let Some(stored) = self.store.owner_secret(vault_id).await? else {
            return Ok(false);
        };

        let stored_digest = cipher.decrypt_string(&stored)?;
        let candidate_digest = secret_digest(candidate);
        Ok(stored_digest
            .as_bytes()
            .ct_eq(candidate_digest.as_bytes())
            .into())
    }
}

impl std::fmt::Debug for OwnerSecretVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerSecretVerifier")
            .field("decoy_policy", &self.decoy_policy)
            .finish_non_exhaustive()
    }
}

/// Hex-encoded SHA-256 of the secret.
fn secret_digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shadowvault_storage::MemoryStore;

    use super::*;
    use crate::crypto::EncryptionKey;

    fn cipher(byte: u8) -> EntryCipher {
        EntryCipher::new(EncryptionKey::from_bytes([byte; 32]))
    }

    async fn store_with_real_and_decoy() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut tx = store.begin().await.unwrap();
        let real = tx.insert_vault(b"a").await.unwrap();
        tx.insert_meta(real, true).await.unwrap();
        let decoy = tx.insert_vault(b"b").await.unwrap();
        tx.insert_meta(decoy, false).await.unwrap();
        tx.insert_shadow(real, decoy).await.unwrap();
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn round_trip() {
        let store = store_with_real_and_decoy().await;
        let verifier = OwnerSecretVerifier::new(store, DecoyOwnerSecretPolicy::Accept);
        let c = cipher(1);

        verifier.set_owner_secret(1, &c, "s1").await.unwrap();
        assert!(verifier.verify(1, &c, "s1").await.unwrap());
        assert!(!verifier.verify(1, &c, "s2").await.unwrap());
    }

    #[tokio::test]
    async fn unset_secret_never_verifies() {
        let store = store_with_real_and_decoy().await;
        let verifier = OwnerSecretVerifier::new(store, DecoyOwnerSecretPolicy::Accept);
        assert!(!verifier.verify(1, &cipher(1), "").await.unwrap());
        assert!(!verifier.verify(1, &cipher(1), "anything").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_secret() {
        let store = store_with_real_and_decoy().await;
        let verifier = OwnerSecretVerifier::new(store, DecoyOwnerSecretPolicy::Accept);
        let c = cipher(1);
        verifier.set_owner_secret(1, &c, "old").await.unwrap();
        verifier.set_owner_secret(1, &c, "new").await.unwrap();
        assert!(!verifier.verify(1, &c, "old").await.unwrap());
        assert!(verifier.verify(1, &c, "new").await.unwrap());
    }

    #[tokio::test]
    async fn stored_digest_is_encrypted() {
        let store = store_with_real_and_decoy().await;
        let verifier = OwnerSecretVerifier::new(store.clone(), DecoyOwnerSecretPolicy::Accept);
        verifier.set_owner_secret(1, &cipher(1), "s1").await.unwrap();

        let stored = store.owner_secret(1).await.unwrap().unwrap();
        let digest = secret_digest("s1");
        assert!(!stored.windows(digest.len()).any(|w| w == digest.as_bytes()));
    }

    #[tokio::test]
    async fn wrong_key_is_a_decryption_error() {
        let store = store_with_real_and_decoy().await;
        let verifier = OwnerSecretVerifier::new(store, DecoyOwnerSecretPolicy::Accept);
        verifier.set_owner_secret(1, &cipher(1), "s1").await.unwrap();
        let err = verifier.verify(1, &cipher(2), "s1").await.unwrap_err();
        assert!(matches!(err, VaultError::Decryption { .. }));
    }

    #[tokio::test]
    async fn accept_policy_stores_on_decoy() {
        let store = store_with_real_and_decoy().await;
        let verifier = OwnerSecretVerifier::new(store, DecoyOwnerSecretPolicy::Accept);
        verifier.set_owner_secret(2, &cipher(2), "s1").await.unwrap();
        assert!(verifier.verify(2, &cipher(2), "s1").await.unwrap());
    }

    #[tokio::test]
    async fn ignore_policy_drops_decoy_writes_only() {
        let store = store_with_real_and_decoy().await;
        let verifier = OwnerSecretVerifier::new(store.clone(), DecoyOwnerSecretPolicy::Ignore);

        verifier.set_owner_secret(2, &cipher(2), "s1").await.unwrap();
        assert!(store.owner_secret(2).await.unwrap().is_none());
        assert!(!verifier.verify(2, &cipher(2), "s1").await.unwrap());

        verifier.set_owner_secret(1, &cipher(1), "s1").await.unwrap();
        assert!(verifier.verify(1, &cipher(1), "s1").await.unwrap());
    }
}
