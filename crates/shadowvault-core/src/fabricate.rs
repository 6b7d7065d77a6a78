//! Fabricated credentials for decoy vaults.
//!
//! The fabricator owns its RNG so tests can seed it and get the same decoy
//! contents on every run. Real credential values are never an input: the
//! username is derived from the service name alone.

use std::sync::{Mutex, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use zeroize::Zeroizing;

/// Characters a fabricated password is drawn from.
const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%";

/// Shortest fabricated password.
pub const MIN_PASSWORD_LEN: usize = 10;

/// A fabricated username/password pair, in plaintext.
pub struct FabricatedCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for FabricatedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricatedCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Produces believable, random credentials for a service name.
pub struct CredentialFabricator {
    rng: Mutex<ChaCha20Rng>,
}

impl CredentialFabricator {
    /// A fabricator seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }

    /// A reproducible fabricator.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }

    /// Fabricate credentials for `service`.
    ///
    /// The username starts as `user_<service lowercased>` and is then
    /// mutated; the password is at least [`MIN_PASSWORD_LEN`] characters and
    /// never shorter than that seed username.
    pub fn fabricate(&self, service: &str) -> FabricatedCredentials {
        let seed_username = format!("user_{}", service.to_lowercase());
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        let username = mutate_username(&mut *rng, &seed_username);
        let length = seed_username.chars().count().max(MIN_PASSWORD_LEN);
        let password = Zeroizing::new(random_password(&mut *rng, length));

        FabricatedCredentials { username, password }
    }
}

impl std::fmt::Debug for CredentialFabricator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialFabricator").finish_non_exhaustive()
    }
}

/// `name@domain` becomes `name.backup@domain`; anything else gets a
/// two-digit suffix.
fn mutate_username<R: Rng>(rng: &mut R, username: &str) -> String {
    if let Some((name, domain)) = username.split_once('@') {
        return format!("{name}.backup@{domain}");
    }
    let suffix: u8 = rng.gen_range(10..=99);
    format!("{username}_{suffix}")
}

fn random_password<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_ALPHABET.len());
            char::from(PASSWORD_ALPHABET[idx])
        })
        .collect()
}
