//! Test doubles shared by the unit tests of this crate.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use shadowvault_storage::{
    EntryRecord, MemoryStore, NewEntry, StorageError, StoreTransaction, VaultId, VaultRecord,
    VaultRole, VaultStore,
};

use crate::config::VaultConfig;
use crate::fabricate::CredentialFabricator;
use crate::kdf::KdfParams;
use crate::service::VaultService;
use crate::session::ManualClock;

/// Sentinel meaning "never fail".
const NEVER: usize = usize::MAX;

/// Sentinel meaning "on every call".
pub(crate) const ALWAYS: usize = usize::MAX;

/// A [`MemoryStore`] whose transactions can be told to fail mid-way.
pub(crate) struct FailingStore {
    inner: MemoryStore,
    entry_budget: Arc<AtomicUsize>,
    stale_real_reads: Arc<AtomicUsize>,
}

impl FailingStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            entry_budget: Arc::new(AtomicUsize::new(NEVER)),
            stale_real_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let the next `n` transactional entry inserts succeed, then fail.
    pub(crate) fn fail_entry_inserts_after(&self, n: usize) {
        self.entry_budget.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` transactional real-vault reads report no real
    /// vault, as a transaction racing a concurrent creator would see it.
    /// The following real-role insert then hits the single-real-vault
    /// constraint. [`ALWAYS`] keeps the read stale forever.
    pub(crate) fn stale_real_vault_reads(&self, n: usize) {
        self.stale_real_reads.store(n, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl VaultStore for FailingStore {
    async fn find_vault_by_salt(&self, salt: &[u8]) -> Result<Option<VaultRecord>, StorageError> {
        self.inner.find_vault_by_salt(salt).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin().await?,
            entry_budget: Arc::clone(&self.entry_budget),
            stale_real_reads: Arc::clone(&self.stale_real_reads),
        }))
    }

    async fn vault_role(&self, vault_id: VaultId) -> Result<Option<VaultRole>, StorageError> {
        self.inner.vault_role(vault_id).await
    }

    async fn real_vault(&self) -> Result<Option<VaultId>, StorageError> {
        self.inner.real_vault().await
    }

    async fn shadow_decoys(&self, real_vault_id: VaultId) -> Result<Vec<VaultId>, StorageError> {
        self.inner.shadow_decoys(real_vault_id).await
    }

    async fn vault_count(&self) -> Result<u64, StorageError> {
        self.inner.vault_count().await
    }

    async fn list_services(&self, vault_id: VaultId) -> Result<Vec<String>, StorageError> {
        self.inner.list_services(vault_id).await
    }

    async fn find_entry(
        &self,
        vault_id: VaultId,
        service: &str,
    ) -> Result<Option<EntryRecord>, StorageError> {
        self.inner.find_entry(vault_id, service).await
    }

    async fn upsert_entry(&self, entry: &NewEntry) -> Result<(), StorageError> {
        self.inner.upsert_entry(entry).await
    }

    async fn delete_entry(&self, vault_id: VaultId, service: &str) -> Result<bool, StorageError> {
        self.inner.delete_entry(vault_id, service).await
    }

    async fn owner_secret(&self, vault_id: VaultId) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.owner_secret(vault_id).await
    }

    async fn set_owner_secret(
        &self,
        vault_id: VaultId,
        cipher: &[u8],
    ) -> Result<(), StorageError> {
        self.inner.set_owner_secret(vault_id, cipher).await
    }
}

struct FailingTransaction {
    inner: Box<dyn StoreTransaction>,
    entry_budget: Arc<AtomicUsize>,
    stale_real_reads: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl StoreTransaction for FailingTransaction {
    async fn insert_vault(&mut self, salt: &[u8]) -> Result<VaultId, StorageError> {
        self.inner.insert_vault(salt).await
    }

    async fn real_vault(&mut self) -> Result<Option<VaultId>, StorageError> {
        let remaining = self.stale_real_reads.load(Ordering::SeqCst);
        if remaining == 0 {
            return self.inner.real_vault().await;
        }
        if remaining != ALWAYS {
            self.stale_real_reads.store(remaining - 1, Ordering::SeqCst);
        }
        Ok(None)
    }

    async fn insert_meta(&mut self, vault_id: VaultId, is_real: bool) -> Result<(), StorageError> {
        self.inner.insert_meta(vault_id, is_real).await
    }

    async fn insert_shadow(
        &mut self,
        real_vault_id: VaultId,
        fake_vault_id: VaultId,
    ) -> Result<(), StorageError> {
        self.inner.insert_shadow(real_vault_id, fake_vault_id).await
    }

    async fn distinct_services(&mut self, vault_id: VaultId) -> Result<Vec<String>, StorageError> {
        self.inner.distinct_services(vault_id).await
    }

    async fn insert_entry(&mut self, entry: &NewEntry) -> Result<(), StorageError> {
        let remaining = self.entry_budget.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(StorageError::Write {
                what: "entry".to_owned(),
                reason: "injected failure".to_owned(),
            });
        }
        if remaining != NEVER {
            self.entry_budget.store(remaining - 1, Ordering::SeqCst);
        }
        self.inner.insert_entry(entry).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.inner.commit().await
    }
}

/// Configuration with a cheap KDF so tests stay fast.
pub(crate) fn fast_config() -> VaultConfig {
    VaultConfig {
        kdf: KdfParams::insecure(1_000),
        ..VaultConfig::default()
    }
}

/// A service over a fresh in-memory store with a manual clock and a seeded
/// fabricator.
pub(crate) fn service_with(
    store: Arc<dyn VaultStore>,
    config: VaultConfig,
) -> (Arc<ManualClock>, VaultService) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let service = VaultService::with_parts(
        store,
        config,
        clock.clone(),
        CredentialFabricator::seeded(42),
    );
    (clock, service)
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Drain the captured output, one string per line.
    pub(crate) fn take_lines(&self) -> Vec<String> {
        let mut bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let text = String::from_utf8_lossy(&bytes).into_owned();
        bytes.clear();
        text.lines().map(str::to_owned).collect()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's `DEBUG` and higher events into a [`LogBuffer`] until
/// the guard drops. Lines carry no timestamp, target or colour codes.
pub(crate) fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_writer(move || writer.clone())
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
