//! Session key store.
//!
//! Binds an opaque session token to an unlocked vault's cipher for a fixed
//! window. Sessions live only in process memory and die with it.
//!
//! # Security model
//!
//! - Tokens are 256 bits from the OS CSPRNG, hex-encoded.
//! - The table is keyed by `SHA-256(token)`; the plaintext token is returned
//!   once at creation and never stored.
//! - Expired sessions are purged on every validation (no background timer).
//! - The TTL runs from creation and is never extended by use.
//! - Every lookup and mutation takes the same lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use shadowvault_storage::VaultId;
use tokio::sync::Mutex;
use tracing::debug;

use crate::crypto::EntryCipher;
use crate::error::VaultError;

/// Number of random bytes in a session token.
const TOKEN_BYTES: usize = 32;

/// Source of the current time.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    /// A clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Session {
    vault_id: VaultId,
    cipher: EntryCipher,
    created_at: DateTime<Utc>,
}

/// Process-wide table of live sessions.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionStore {
    /// An empty store whose sessions expire `ttl` after creation.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
            ttl,
        }
    }

    /// Open a session for `vault_id` holding `cipher`.
    ///
    /// Returns the plaintext token (shown once, never stored).
    pub async fn create(&self, vault_id: VaultId, cipher: EntryCipher) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let session = Session {
            vault_id,
            cipher,
            created_at: self.clock.now(),
        };
        let token_hash = hash_token(&token);
        debug!(vault_id, token_hash_prefix = &token_hash[..8], "session created");
        self.sessions.lock().await.insert(token_hash, session);
        token
    }

    /// Return the cipher of a live session bound to `vault_id`.
    ///
    /// Purges every expired session first. A session is valid while
    /// `now - created_at < ttl`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidSession`] if the token is unknown or expired.
    /// - [`VaultError::VaultMismatch`] if the session belongs to another vault.
    pub async fn validate(
        &self,
        session_id: &str,
        vault_id: VaultId,
    ) -> Result<EntryCipher, VaultError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;

        let before = sessions.len();
        sessions.retain(|_, s| now.signed_duration_since(s.created_at) < self.ttl);
        let purged = before.saturating_sub(sessions.len());
        if purged > 0 {
            debug!(purged, "expired sessions purged");
        }

        let session = sessions
            .get(&hash_token(session_id))
            .ok_or(VaultError::InvalidSession)?;

        if session.vault_id != vault_id {
            return Err(VaultError::VaultMismatch {
                session_vault: session.vault_id,
                requested: vault_id,
            });
        }

        Ok(session.cipher.clone())
    }

    /// End a session. Returns whether it existed.
    pub async fn revoke(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .remove(&hash_token(session_id))
            .is_some()
    }

    /// Drop every session, zeroizing their keys.
    pub async fn clear(&self) {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        sessions.clear();
        debug!(count, "session store cleared");
    }

    /// Number of sessions currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no sessions are held.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Hash a plaintext token with SHA-256, returning the hex-encoded digest.
fn hash_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}
