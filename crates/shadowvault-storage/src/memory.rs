//! In-memory store.
//!
//! All four collections live in one [`Tables`] value behind a
//! `tokio::sync::Mutex`. A transaction holds the lock for its whole lifetime
//! and writes to a staged copy, which replaces the live tables on commit.
//! Dropping the transaction drops the staged copy, so partial writes never
//! become visible. Nothing survives process exit.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    EntryRecord, NewEntry, StorageError, StoreTransaction, VaultId, VaultRecord, VaultRole,
    VaultStore,
};

#[derive(Debug, Clone)]
struct MetaRow {
    is_real: bool,
    owner_secret_hash: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct Tables {
    next_vault_id: VaultId,
    next_entry_id: i64,
    vaults: BTreeMap<VaultId, Vec<u8>>,
    meta: BTreeMap<VaultId, MetaRow>,
    /// `fake_vault_id -> real_vault_id`
    shadow: BTreeMap<VaultId, VaultId>,
    /// `(vault_id, service) -> entry`
    entries: BTreeMap<(VaultId, String), EntryRecord>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            next_vault_id: 1,
            next_entry_id: 1,
            vaults: BTreeMap::new(),
            meta: BTreeMap::new(),
            shadow: BTreeMap::new(),
            entries: BTreeMap::new(),
        }
    }
}

impl Tables {
    fn find_vault_by_salt(&self, salt: &[u8]) -> Option<VaultRecord> {
        self.vaults
            .iter()
            .find(|(_, s)| s.as_slice() == salt)
            .map(|(id, s)| VaultRecord {
                id: *id,
                salt: s.clone(),
            })
    }

    fn real_vault(&self) -> Option<VaultId> {
        self.meta
            .iter()
            .find(|(_, row)| row.is_real)
            .map(|(id, _)| *id)
    }

    fn insert_vault(&mut self, salt: &[u8]) -> Result<VaultId, StorageError> {
        if self.find_vault_by_salt(salt).is_some() {
            return Err(StorageError::Conflict {
                constraint: "vaults.salt".to_owned(),
            });
        }
        let id = self.next_vault_id;
        self.next_vault_id = id.saturating_add(1);
        self.vaults.insert(id, salt.to_vec());
        Ok(id)
    }

    fn insert_meta(&mut self, vault_id: VaultId, is_real: bool) -> Result<(), StorageError> {
        if self.meta.contains_key(&vault_id) {
            return Err(StorageError::Conflict {
                constraint: "vault_meta.vault_id".to_owned(),
            });
        }
        if is_real && self.real_vault().is_some() {
            return Err(StorageError::Conflict {
                constraint: "vault_meta.is_real".to_owned(),
            });
        }
        self.meta.insert(
            vault_id,
            MetaRow {
                is_real,
                owner_secret_hash: None,
            },
        );
        Ok(())
    }

    fn insert_shadow(
        &mut self,
        real_vault_id: VaultId,
        fake_vault_id: VaultId,
    ) -> Result<(), StorageError> {
        if self.shadow.contains_key(&fake_vault_id) {
            return Err(StorageError::Conflict {
                constraint: "vault_shadow_map.fake_vault_id".to_owned(),
            });
        }
        self.shadow.insert(fake_vault_id, real_vault_id);
        Ok(())
    }

    fn distinct_services(&self, vault_id: VaultId) -> Vec<String> {
        // Keys are ordered by (vault_id, service), so this is already sorted.
        self.entries
            .keys()
            .filter(|(v, _)| *v == vault_id)
            .map(|(_, service)| service.clone())
            .collect()
    }

    fn insert_entry(&mut self, entry: &NewEntry, replace: bool) -> Result<(), StorageError> {
        let key = (entry.vault_id, entry.service.clone());
        if !replace && self.entries.contains_key(&key) {
            return Err(StorageError::Conflict {
                constraint: "entries.vault_id_service".to_owned(),
            });
        }
        let id = self.next_entry_id;
        self.next_entry_id = id.saturating_add(1);
        self.entries.insert(
            key,
            EntryRecord {
                id,
                vault_id: entry.vault_id,
                service: entry.service.clone(),
                username_cipher: entry.username_cipher.clone(),
                password_cipher: entry.password_cipher.clone(),
            },
        );
        Ok(())
    }
}

/// An in-memory store.
///
/// Cloning shares the underlying tables.
///
/// # Examples
///
/// ```
/// # use shadowvault_storage::{MemoryStore, VaultStore};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new();
/// let mut tx = store.begin().await.unwrap();
/// let id = tx.insert_vault(b"0123456789abcdef").await.unwrap();
/// tx.insert_meta(id, true).await.unwrap();
/// tx.commit().await.unwrap();
/// assert_eq!(store.real_vault().await.unwrap(), Some(id));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl VaultStore for MemoryStore {
    async fn find_vault_by_salt(&self, salt: &[u8]) -> Result<Option<VaultRecord>, StorageError> {
        Ok(self.tables.lock().await.find_vault_by_salt(salt))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, staged }))
    }

    async fn vault_role(&self, vault_id: VaultId) -> Result<Option<VaultRole>, StorageError> {
        let tables = self.tables.lock().await;
        let Some(meta) = tables.meta.get(&vault_id) else {
            return Ok(None);
        };
        if meta.is_real {
            return Ok(Some(VaultRole::Real));
        }
        tables
            .shadow
            .get(&vault_id)
            .map(|real| Some(VaultRole::Decoy { real_vault_id: *real }))
            .ok_or_else(|| StorageError::Inconsistent {
                vault_id,
                reason: "non-real vault has no shadow mapping".to_owned(),
            })
    }

    async fn real_vault(&self) -> Result<Option<VaultId>, StorageError> {
        Ok(self.tables.lock().await.real_vault())
    }

    async fn shadow_decoys(&self, real_vault_id: VaultId) -> Result<Vec<VaultId>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .shadow
            .iter()
            .filter(|(_, real)| **real == real_vault_id)
            .map(|(fake, _)| *fake)
            .collect())
    }

    async fn vault_count(&self) -> Result<u64, StorageError> {
        let tables = self.tables.lock().await;
        Ok(u64::try_from(tables.vaults.len()).unwrap_or(u64::MAX))
    }

    async fn list_services(&self, vault_id: VaultId) -> Result<Vec<String>, StorageError> {
        Ok(self.tables.lock().await.distinct_services(vault_id))
    }

    async fn find_entry(
        &self,
        vault_id: VaultId,
        service: &str,
    ) -> Result<Option<EntryRecord>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables.entries.get(&(vault_id, service.to_owned())).cloned())
    }

    async fn upsert_entry(&self, entry: &NewEntry) -> Result<(), StorageError> {
        self.tables.lock().await.insert_entry(entry, true)
    }

    async fn delete_entry(&self, vault_id: VaultId, service: &str) -> Result<bool, StorageError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.entries.remove(&(vault_id, service.to_owned())).is_some())
    }

    async fn owner_secret(&self, vault_id: VaultId) -> Result<Option<Vec<u8>>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .meta
            .get(&vault_id)
            .and_then(|row| row.owner_secret_hash.clone()))
    }

    async fn set_owner_secret(
        &self,
        vault_id: VaultId,
        cipher: &[u8],
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        let row = tables.meta.entry(vault_id).or_insert(MetaRow {
            is_real: false,
            owner_secret_hash: None,
        });
        row.owner_secret_hash = Some(cipher.to_vec());
        Ok(())
    }
}

/// A transaction over [`MemoryStore`]. Holds the table lock until dropped.
struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait::async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_vault(&mut self, salt: &[u8]) -> Result<VaultId, StorageError> {
        self.staged.insert_vault(salt)
    }

    async fn real_vault(&mut self) -> Result<Option<VaultId>, StorageError> {
        Ok(self.staged.real_vault())
    }

    async fn insert_meta(&mut self, vault_id: VaultId, is_real: bool) -> Result<(), StorageError> {
        self.staged.insert_meta(vault_id, is_real)
    }

    async fn insert_shadow(
        &mut self,
        real_vault_id: VaultId,
        fake_vault_id: VaultId,
    ) -> Result<(), StorageError> {
        self.staged.insert_shadow(real_vault_id, fake_vault_id)
    }

    async fn distinct_services(&mut self, vault_id: VaultId) -> Result<Vec<String>, StorageError> {
        Ok(self.staged.distinct_services(vault_id))
    }

    async fn insert_entry(&mut self, entry: &NewEntry) -> Result<(), StorageError> {
        self.staged.insert_entry(entry, false)
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let MemoryTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
