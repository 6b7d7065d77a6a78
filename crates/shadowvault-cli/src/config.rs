//! CLI configuration for `ShadowVault`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Command-line flags override what the environment provides.

/// Path that selects the in-memory store instead of a database file.
pub const MEMORY_DB: &str = ":memory:";

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Where vaults are persisted.
    pub store: StoreLocation,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Log line format.
    pub log_format: LogFormat,
}

/// Supported store locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// In-memory, gone when the process exits.
    Memory,
    /// `SQLite` database file, created if missing.
    Sqlite { path: String },
    /// `SQLite` connection URL such as `sqlite://vault.db?mode=rwc`.
    SqliteUrl { url: String },
}

impl StoreLocation {
    fn parse(value: &str) -> Self {
        if value == MEMORY_DB {
            Self::Memory
        } else if value.starts_with("sqlite:") {
            Self::SqliteUrl {
                url: value.to_owned(),
            }
        } else {
            Self::Sqlite {
                path: value.to_owned(),
            }
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SHADOWVAULT_DB`: database path, `sqlite:` URL, or `:memory:` (default: `./shadowvault.db`)
    /// - `SHADOWVAULT_LOG_LEVEL`: log filter (default: `warn`)
    /// - `SHADOWVAULT_LOG_FORMAT`: `text` or `json` (default: `text`)
    ///
    /// `RUST_LOG`, when set, takes precedence over `SHADOWVAULT_LOG_LEVEL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let store = StoreLocation::parse(
            &lookup("SHADOWVAULT_DB").unwrap_or_else(|| "./shadowvault.db".to_owned()),
        );

        let log_level = lookup("SHADOWVAULT_LOG_LEVEL").unwrap_or_else(|| "warn".to_owned());

        let log_format = match lookup("SHADOWVAULT_LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            store,
            log_level,
            log_format,
        }
    }

    /// Replace the store location with the `--db` flag, if given.
    #[must_use]
    pub fn with_db(mut self, db: Option<&str>) -> Self {
        if let Some(db) = db {
            self.store = StoreLocation::parse(db);
        }
        self
    }
}
