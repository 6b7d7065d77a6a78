//! Persistent store contract for `ShadowVault`.
//!
//! This crate defines the [`VaultStore`] trait, a small relational contract
//! over four collections (vaults, vault meta, shadow map, entries). It knows
//! nothing about key derivation or decoy fabrication. Credential fields
//! arrive here already encrypted under the owning vault's key; the store only
//! ever sees ciphertext.
//!
//! Two implementations are provided:
//!
//! - [`SqliteStore`]: production default, backed by `SQLite` via `sqlx`
//!   (feature `sqlite-backend`)
//! - [`MemoryStore`]: in-memory, for tests and throwaway sessions
//!
//! Both enforce the same uniqueness rules: one vault per salt, one meta row
//! per vault, at most one real vault, at most one shadow row per decoy, and
//! one entry per `(vault, service)`.

mod error;
mod memory;
#[cfg(feature = "sqlite-backend")]
mod sqlite;

pub use error::StorageError;
pub use memory::MemoryStore;
#[cfg(feature = "sqlite-backend")]
pub use sqlite::SqliteStore;

/// Identifier of a vault row.
pub type VaultId = i64;

/// A persisted vault: an id and the password fingerprint it was created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRecord {
    pub id: VaultId,
    pub salt: Vec<u8>,
}

/// Whether a vault is the real one or a decoy shadowing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultRole {
    /// The first vault ever created.
    Real,
    /// Any later vault, mirroring the real vault's service list.
    Decoy { real_vault_id: VaultId },
}

/// An entry to insert. Both credential fields are ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub vault_id: VaultId,
    pub service: String,
    pub username_cipher: Vec<u8>,
    pub password_cipher: Vec<u8>,
}

/// A stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub id: i64,
    pub vault_id: VaultId,
    pub service: String,
    pub username_cipher: Vec<u8>,
    pub password_cipher: Vec<u8>,
}

/// A pluggable persistent store.
///
/// Single-row operations are atomic on their own. Multi-row writes that must
/// land together (vault creation with its role and mirrored entries) go
/// through [`VaultStore::begin`].
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait VaultStore: Send + Sync + 'static {
    /// Look up a vault by its salt.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn find_vault_by_salt(&self, salt: &[u8]) -> Result<Option<VaultRecord>, StorageError>;

    /// Start an atomic multi-row write.
    ///
    /// Dropping the returned transaction without calling
    /// [`StoreTransaction::commit`] discards every write made through it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the backend cannot start one.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError>;

    /// Role of a vault, or `None` if the vault has no meta row.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails, or
    /// [`StorageError::Inconsistent`] if a non-real vault has no shadow row.
    async fn vault_role(&self, vault_id: VaultId) -> Result<Option<VaultRole>, StorageError>;

    /// Id of the real vault, if one has been created.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn real_vault(&self) -> Result<Option<VaultId>, StorageError>;

    /// Decoys shadowing the given real vault, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the backend fails.
    async fn shadow_decoys(&self, real_vault_id: VaultId) -> Result<Vec<VaultId>, StorageError>;

    /// Number of vault rows.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn vault_count(&self) -> Result<u64, StorageError>;

    /// Distinct service names of a vault, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the backend fails.
    async fn list_services(&self, vault_id: VaultId) -> Result<Vec<String>, StorageError>;

    /// The entry for `(vault_id, service)`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn find_entry(
        &self,
        vault_id: VaultId,
        service: &str,
    ) -> Result<Option<EntryRecord>, StorageError>;

    /// Insert an entry, replacing any existing entry for the same service.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn upsert_entry(&self, entry: &NewEntry) -> Result<(), StorageError>;

    /// Delete the entry for `(vault_id, service)`.
    ///
    /// Returns whether a row was removed. Deleting a missing entry is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the backend fails.
    async fn delete_entry(&self, vault_id: VaultId, service: &str) -> Result<bool, StorageError>;

    /// Encrypted owner-secret digest of a vault, if one was set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn owner_secret(&self, vault_id: VaultId) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store the encrypted owner-secret digest, overwriting any prior value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn set_owner_secret(&self, vault_id: VaultId, cipher: &[u8])
    -> Result<(), StorageError>;
}

/// An open multi-row write. Nothing is visible to other readers until
/// [`commit`](StoreTransaction::commit) succeeds.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    /// Insert a vault row for `salt` and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if a vault with this salt exists.
    async fn insert_vault(&mut self, salt: &[u8]) -> Result<VaultId, StorageError>;

    /// Id of the real vault as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn real_vault(&mut self) -> Result<Option<VaultId>, StorageError>;

    /// Insert the meta row of a vault.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the vault already has a meta row
    /// or `is_real` is set while another real vault exists.
    async fn insert_meta(&mut self, vault_id: VaultId, is_real: bool) -> Result<(), StorageError>;

    /// Record that `fake_vault_id` shadows `real_vault_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the decoy already has a row.
    async fn insert_shadow(
        &mut self,
        real_vault_id: VaultId,
        fake_vault_id: VaultId,
    ) -> Result<(), StorageError>;

    /// Distinct service names of a vault, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the backend fails.
    async fn distinct_services(&mut self, vault_id: VaultId) -> Result<Vec<String>, StorageError>;

    /// Insert an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the service already has an entry
    /// in that vault.
    async fn insert_entry(&mut self, entry: &NewEntry) -> Result<(), StorageError>;

    /// Make every write of this transaction durable and visible.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the commit fails; nothing is
    /// written in that case.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}
