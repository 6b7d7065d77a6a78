//! `ShadowVault` CLI: a deniable password manager on a local database.
//!
//! Every invocation unlocks the vault of `--password`, performs exactly one
//! operation, and logs out. Any password opens a vault; only the first one
//! ever used opens the real one.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use shadowvault_core::{AuthOutcome, VaultConfig, VaultService};
use shadowvault_storage::{MemoryStore, SqliteStore, VaultStore};
use tracing::{debug, info};

use crate::config::{CliConfig, LogFormat, StoreLocation};

/// ShadowVault: every password opens a vault.
#[derive(Parser)]
#[command(
    name = "shadowvault",
    version,
    about = "ShadowVault CLI: a password manager with plausible deniability",
    long_about = None,
    after_help = "Environment variables:\n  \
         SHADOWVAULT_DB          Database path, sqlite: URL or :memory: (default: ./shadowvault.db)\n  \
         SHADOWVAULT_PASSWORD    Vault password\n  \
         SHADOWVAULT_LOG_LEVEL   Log filter (default: warn)\n  \
         SHADOWVAULT_LOG_FORMAT  text or json\n\n\
         Examples:\n  \
         shadowvault --password hunter2 add Mail me@example.com s3cret\n  \
         shadowvault --password hunter2 read Mail\n  \
         shadowvault --password hunter2 --json list"
)]
struct Cli {
    /// Database path, `sqlite:` URL, or `:memory:` for a throwaway store.
    #[arg(long)]
    db: Option<String>,

    /// Vault password.
    #[arg(long, env = "SHADOWVAULT_PASSWORD", hide_env_values = true)]
    password: String,

    /// Print results as JSON.
    #[arg(long, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the services stored in the vault.
    List,
    /// Store credentials for a service, replacing any existing entry.
    Add {
        service: String,
        username: String,
        password: String,
    },
    /// Show the credentials stored for a service.
    Read { service: String },
    /// Delete the entry for a service.
    Delete { service: String },
    /// Set the owner secret that proves this vault is authentic.
    #[command(name = "set-owner-secret")]
    SetOwnerSecret { secret: String },
    /// Check a candidate owner secret.
    #[command(name = "verify-owner")]
    VerifyOwner { secret: String },
    /// Print the id of the vault this password opens.
    Whoami,
}

#[derive(Serialize)]
struct ServiceList {
    services: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = CliConfig::from_env().with_db(cli.db.as_deref());
    init_tracing(&config);

    match run(&config, cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &CliConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn open_store(location: &StoreLocation) -> Result<Arc<dyn VaultStore>> {
    match location {
        StoreLocation::Memory => {
            info!("using in-memory store (data will not persist)");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreLocation::Sqlite { path } => {
            debug!(path = %path, "using sqlite store");
            let store = SqliteStore::open(path)
                .await
                .with_context(|| format!("failed to open database at {path}"))?;
            Ok(Arc::new(store))
        }
        StoreLocation::SqliteUrl { url } => {
            debug!("using sqlite store from url");
            let store = SqliteStore::connect(url)
                .await
                .context("failed to connect to database url")?;
            Ok(Arc::new(store))
        }
    }
}

async fn run(config: &CliConfig, cli: Cli) -> Result<()> {
    let store = open_store(&config.store).await?;
    let service = VaultService::new(store, VaultConfig::default());

    let auth = service
        .authenticate(&cli.password)
        .await
        .context("failed to open vault")?;

    let result = execute(&service, &auth, cli.command, cli.json).await;

    service.logout(&auth.session_id).await;
    service.shutdown().await;
    result
}

async fn execute(
    service: &VaultService,
    auth: &AuthOutcome,
    command: Commands,
    json: bool,
) -> Result<()> {
    let session = auth.session_id.as_str();
    let vault = auth.vault_id;

    match command {
        Commands::List => {
            let services = service
                .list_services(session, vault)
                .await
                .context("failed to list services")?;
            if json {
                print_json(&ServiceList { services })?;
            } else {
                for name in &services {
                    println!("{name}");
                }
            }
        }
        Commands::Add {
            service: name,
            username,
            password,
        } => {
            service
                .add_entry(session, vault, &name, &username, &password)
                .await
                .with_context(|| format!("failed to store entry for '{name}'"))?;
            if json {
                print_json(&json!({ "service": name, "stored": true }))?;
            } else {
                println!("stored {name}");
            }
        }
        Commands::Read { service: name } => {
            let credentials = service
                .read_entry(session, vault, &name)
                .await
                .with_context(|| format!("failed to read entry for '{name}'"))?;
            if json {
                print_json(&credentials)?;
            } else {
                println!("username: {}", credentials.username);
                println!("password: {}", credentials.password);
            }
        }
        Commands::Delete { service: name } => {
            service
                .delete_entry(session, vault, &name)
                .await
                .with_context(|| format!("failed to delete entry for '{name}'"))?;
            if json {
                print_json(&json!({ "service": name, "deleted": true }))?;
            } else {
                println!("deleted {name}");
            }
        }
        Commands::SetOwnerSecret { secret } => {
            service
                .set_owner_secret(session, vault, &secret)
                .await
                .context("failed to set owner secret")?;
            if json {
                print_json(&json!({ "owner_secret_set": true }))?;
            } else {
                println!("owner secret set");
            }
        }
        Commands::VerifyOwner { secret } => {
            let verification = service
                .verify_owner(session, vault, &secret)
                .await
                .context("failed to verify owner secret")?;
            if json {
                print_json(&verification)?;
            } else if verification.is_real {
                println!("verified");
            } else {
                println!("not verified");
            }
        }
        Commands::Whoami => {
            if json {
                print_json(&json!({ "vault_id": vault }))?;
            } else {
                println!("{vault}");
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to format JSON")?;
    println!("{text}");
    Ok(())
}
