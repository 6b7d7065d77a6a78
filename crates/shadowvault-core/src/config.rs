//! Runtime configuration for the vault service.

use chrono::Duration;

use crate::kdf::KdfParams;

/// How long a session stays valid after creation, in seconds.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 60;

/// What `set_owner_secret` does on a decoy vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoyOwnerSecretPolicy {
    /// Store the digest exactly as on the real vault.
    #[default]
    Accept,
    /// Acknowledge the write but store nothing, so a later verify on the
    /// decoy always reports `false`.
    Ignore,
}

/// Settings for [`VaultService`](crate::service::VaultService).
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Fixed session lifetime; activity does not extend it.
    pub session_ttl: Duration,
    /// Key-stretching cost.
    pub kdf: KdfParams,
    /// Owner-secret handling on decoys.
    pub decoy_owner_secret: DecoyOwnerSecretPolicy,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            kdf: KdfParams::default(),
            decoy_owner_secret: DecoyOwnerSecretPolicy::default(),
        }
    }
}
