//! `SQLite` store, the production default.
//!
//! Feature-gated behind `sqlite-backend`. Uses `sqlx` with the Tokio runtime
//! for fully async operations. The schema is created on open; the
//! single-real-vault rule is a partial unique index, so it holds across
//! processes and crash recovery, not only inside one process.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use crate::{
    EntryRecord, NewEntry, StorageError, StoreTransaction, VaultId, VaultRecord, VaultRole,
    VaultStore,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS vaults (\
        id   INTEGER PRIMARY KEY AUTOINCREMENT, \
        salt BLOB    NOT NULL UNIQUE\
    )",
    "CREATE TABLE IF NOT EXISTS vault_meta (\
        vault_id          INTEGER NOT NULL UNIQUE REFERENCES vaults(id), \
        is_real           INTEGER NOT NULL DEFAULT 0, \
        owner_secret_hash BLOB\
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_vault_meta_single_real \
     ON vault_meta (is_real) WHERE is_real = 1",
    "CREATE TABLE IF NOT EXISTS vault_shadow_map (\
        real_vault_id INTEGER NOT NULL REFERENCES vaults(id), \
        fake_vault_id INTEGER NOT NULL UNIQUE REFERENCES vaults(id)\
    )",
    "CREATE TABLE IF NOT EXISTS entries (\
        id       INTEGER PRIMARY KEY AUTOINCREMENT, \
        vault_id INTEGER NOT NULL REFERENCES vaults(id), \
        service  TEXT    NOT NULL, \
        username BLOB    NOT NULL, \
        password BLOB    NOT NULL, \
        UNIQUE (vault_id, service)\
    )",
];

type EntryRow = (i64, VaultId, String, Vec<u8>, Vec<u8>);

/// A store backed by an `SQLite` database file.
///
/// Thread-safe via `SqlitePool`. Cloning shares the pool.
///
/// # Examples
///
/// ```no_run
/// # use shadowvault_storage::SqliteStore;
/// # #[tokio::main]
/// # async fn main() {
/// let store = SqliteStore::open("/var/lib/shadowvault/vault.db").await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("pool", &"[SqlitePool]")
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path` and apply the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or the
    /// schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect_with(options, 8, &path.display().to_string()).await
    }

    /// Connect using an `sqlite:` URL.
    ///
    /// `sqlite::memory:` gives a private database that lives as long as the
    /// store; the pool is pinned to one connection so every query sees it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the URL is invalid or the schema
    /// cannot be applied.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url).map_err(|e| StorageError::Open {
            path: url.to_owned(),
            reason: e.to_string(),
        })?;
        let max_connections = if url.contains(":memory:") { 1 } else { 8 };
        Self::connect_with(options, max_connections, url).await
    }

    async fn connect_with(
        options: SqliteConnectOptions,
        max_connections: u32,
        label: &str,
    ) -> Result<Self, StorageError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Open {
                path: label.to_owned(),
                reason: e.to_string(),
            })?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| StorageError::Open {
                    path: label.to_owned(),
                    reason: format!("migration failed: {e}"),
                })?;
        }

        debug!(path = %label, "sqlite schema ready");
        Ok(Self { pool })
    }
}

/// Map a write failure, turning unique violations into [`StorageError::Conflict`].
fn write_error(e: &sqlx::Error, constraint: &str, what: &str) -> StorageError {
    if let sqlx::Error::Database(db) = e {
        if db.is_unique_violation() {
            return StorageError::Conflict {
                constraint: constraint.to_owned(),
            };
        }
    }
    StorageError::Write {
        what: what.to_owned(),
        reason: e.to_string(),
    }
}

fn read_error(e: &sqlx::Error, what: &str) -> StorageError {
    StorageError::Read {
        what: what.to_owned(),
        reason: e.to_string(),
    }
}

fn list_error(e: &sqlx::Error, what: &str) -> StorageError {
    StorageError::List {
        what: what.to_owned(),
        reason: e.to_string(),
    }
}

fn entry_from_row((id, vault_id, service, username_cipher, password_cipher): EntryRow) -> EntryRecord {
    EntryRecord {
        id,
        vault_id,
        service,
        username_cipher,
        password_cipher,
    }
}

#[async_trait::async_trait]
impl VaultStore for SqliteStore {
    async fn find_vault_by_salt(&self, salt: &[u8]) -> Result<Option<VaultRecord>, StorageError> {
        let row: Option<(VaultId, Vec<u8>)> =
            sqlx::query_as("SELECT id, salt FROM vaults WHERE salt = ?")
                .bind(salt)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error(&e, "vault by salt"))?;

        Ok(row.map(|(id, salt)| VaultRecord { id, salt }))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Transaction {
                reason: e.to_string(),
            })?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn vault_role(&self, vault_id: VaultId) -> Result<Option<VaultRole>, StorageError> {
        let row: Option<(bool, Option<VaultId>)> = sqlx::query_as(
            "SELECT m.is_real, s.real_vault_id \
             FROM vault_meta m \
             LEFT JOIN vault_shadow_map s ON s.fake_vault_id = m.vault_id \
             WHERE m.vault_id = ?",
        )
        .bind(vault_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(&e, "vault role"))?;

        match row {
            None => Ok(None),
            Some((true, _)) => Ok(Some(VaultRole::Real)),
            Some((false, Some(real_vault_id))) => Ok(Some(VaultRole::Decoy { real_vault_id })),
            Some((false, None)) => Err(StorageError::Inconsistent {
                vault_id,
                reason: "non-real vault has no shadow mapping".to_owned(),
            }),
        }
    }

    async fn real_vault(&self) -> Result<Option<VaultId>, StorageError> {
        let row: Option<(VaultId,)> =
            sqlx::query_as("SELECT vault_id FROM vault_meta WHERE is_real = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error(&e, "real vault"))?;
        Ok(row.map(|(id,)| id))
    }

    async fn shadow_decoys(&self, real_vault_id: VaultId) -> Result<Vec<VaultId>, StorageError> {
        let rows: Vec<(VaultId,)> = sqlx::query_as(
            "SELECT fake_vault_id FROM vault_shadow_map \
             WHERE real_vault_id = ? ORDER BY fake_vault_id",
        )
        .bind(real_vault_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| list_error(&e, "shadow map"))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn vault_count(&self) -> Result<u64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vaults")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| read_error(&e, "vault count"))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_services(&self, vault_id: VaultId) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT service FROM entries WHERE vault_id = ? ORDER BY service",
        )
        .bind(vault_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| list_error(&e, "services"))?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn find_entry(
        &self,
        vault_id: VaultId,
        service: &str,
    ) -> Result<Option<EntryRecord>, StorageError> {
        let row: Option<EntryRow> = sqlx::query_as(
            "SELECT id, vault_id, service, username, password \
             FROM entries WHERE vault_id = ? AND service = ?",
        )
        .bind(vault_id)
        .bind(service)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(&e, "entry"))?;
        Ok(row.map(entry_from_row))
    }

    async fn upsert_entry(&self, entry: &NewEntry) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO entries (vault_id, service, username, password) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (vault_id, service) DO UPDATE SET \
                username = excluded.username, password = excluded.password",
        )
        .bind(entry.vault_id)
        .bind(&entry.service)
        .bind(&entry.username_cipher)
        .bind(&entry.password_cipher)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(&e, "entries.vault_id_service", "entry"))?;
        Ok(())
    }

    async fn delete_entry(&self, vault_id: VaultId, service: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM entries WHERE vault_id = ? AND service = ?")
            .bind(vault_id)
            .bind(service)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Delete {
                what: "entry".to_owned(),
                reason: e.to_string(),
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn owner_secret(&self, vault_id: VaultId) -> Result<Option<Vec<u8>>, StorageError> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as("SELECT owner_secret_hash FROM vault_meta WHERE vault_id = ?")
                .bind(vault_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| read_error(&e, "owner secret"))?;
        Ok(row.and_then(|(hash,)| hash))
    }

    async fn set_owner_secret(
        &self,
        vault_id: VaultId,
        cipher: &[u8],
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO vault_meta (vault_id, is_real, owner_secret_hash) VALUES (?, 0, ?) \
             ON CONFLICT (vault_id) DO UPDATE SET owner_secret_hash = excluded.owner_secret_hash",
        )
        .bind(vault_id)
        .bind(cipher)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(&e, "vault_meta.vault_id", "owner secret"))?;
        Ok(())
    }
}

/// A transaction over [`SqliteStore`]. Rolled back by `sqlx` when dropped
/// without commit.
struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait::async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn insert_vault(&mut self, salt: &[u8]) -> Result<VaultId, StorageError> {
        let result = sqlx::query("INSERT INTO vaults (salt) VALUES (?)")
            .bind(salt)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error(&e, "vaults.salt", "vault"))?;
        Ok(result.last_insert_rowid())
    }

    async fn real_vault(&mut self) -> Result<Option<VaultId>, StorageError> {
        let row: Option<(VaultId,)> =
            sqlx::query_as("SELECT vault_id FROM vault_meta WHERE is_real = 1")
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| read_error(&e, "real vault"))?;
        Ok(row.map(|(id,)| id))
    }

    async fn insert_meta(&mut self, vault_id: VaultId, is_real: bool) -> Result<(), StorageError> {
        let constraint = if is_real {
            "vault_meta.is_real"
        } else {
            "vault_meta.vault_id"
        };
        sqlx::query("INSERT INTO vault_meta (vault_id, is_real) VALUES (?, ?)")
            .bind(vault_id)
            .bind(is_real)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error(&e, constraint, "vault meta"))?;
        Ok(())
    }

    async fn insert_shadow(
        &mut self,
        real_vault_id: VaultId,
        fake_vault_id: VaultId,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO vault_shadow_map (real_vault_id, fake_vault_id) VALUES (?, ?)")
            .bind(real_vault_id)
            .bind(fake_vault_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error(&e, "vault_shadow_map.fake_vault_id", "shadow map"))?;
        Ok(())
    }

    async fn distinct_services(&mut self, vault_id: VaultId) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT service FROM entries WHERE vault_id = ? ORDER BY service",
        )
        .bind(vault_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| list_error(&e, "services"))?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn insert_entry(&mut self, entry: &NewEntry) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO entries (vault_id, service, username, password) VALUES (?, ?, ?, ?)",
        )
        .bind(entry.vault_id)
        .bind(&entry.service)
        .bind(&entry.username_cipher)
        .bind(&entry.password_cipher)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error(&e, "entries.vault_id_service", "entry"))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::Transaction {
                reason: e.to_string(),
            })
    }
}
