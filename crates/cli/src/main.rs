//! Identity Registry Command Line Interface
//!
//! Drives a local identity registry. The `--caller` and `--height` options
//! stand in for the caller identity and block height a hosting chain would
//! assert on every call.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ippan_identity_registry::config::StorageBackend;
use ippan_identity_registry::{
    AccountId, CallContext, ErrorCategory, HistoryEntry, IdentityHash, IdentityRecord,
    IdentityRegistry, IdentityStore, RegistryConfig, RegistryError,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "identity-cli")]
#[command(about = "Identity registry command line interface", long_about = None)]
#[command(version)]
struct Cli {
    /// Registry configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database directory; selects the sled backend
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Admin account (hex), overrides the configuration
    #[arg(long)]
    admin: Option<String>,

    /// Calling account (hex), required for mutating commands
    #[arg(long)]
    caller: Option<String>,

    /// Block height stamped on the call
    #[arg(long, default_value_t = 0)]
    height: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the identity hash of raw identity data
    Hash {
        /// Raw identity data
        data: String,
    },
    /// Register an identity hash for the caller
    Register {
        /// Identity hash (hex)
        hash: String,
        metadata: String,
    },
    /// Replace the metadata of an owned identity
    UpdateMetadata {
        hash: String,
        metadata: String,
        /// Description recorded in the history log
        changes: String,
    },
    /// Set free-form status text on an owned identity
    SetStatus {
        hash: String,
        status: String,
        changes: String,
    },
    /// Verify an identity (admin)
    Verify { hash: String },
    /// Suspend an identity (admin)
    Suspend { hash: String, reason: String },
    /// Transfer an owned identity to another account
    Transfer {
        hash: String,
        /// Receiving account (hex)
        new_owner: String,
    },
    /// Show an identity record
    Show { hash: String },
    /// Look up the identity owned by an account
    Owner { account: String },
    /// Show the change history of an identity
    History {
        hash: String,
        /// Only this sequence number
        #[arg(long)]
        seq: Option<u64>,
    },
    /// Number of logged changes for an identity
    Count { hash: String },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Hash { data } = &cli.command {
        let hash = IdentityHash::digest(data.as_bytes());
        println!("{}", serde_json::to_string_pretty(&json!({ "hash": hash.to_string() }))?);
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    init_tracing(&config.logging.level);

    let mut registry = config
        .open_registry()
        .context("failed to open identity registry")?;
    info!(
        backend = backend_label(&config),
        admin = %registry.admin(),
        "Opened identity registry"
    );
    let outcome = execute(&cli, &mut registry);
    registry.store().flush()?;

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => match err.downcast_ref::<RegistryError>() {
            Some(registry_err) if registry_err.category() != ErrorCategory::Infrastructure => {
                let body = json!({ "error": registry_err.to_string(), "code": registry_err.code() });
                println!("{}", serde_json::to_string_pretty(&body)?);
                Ok(ExitCode::FAILURE)
            }
            _ => Err(err),
        },
    }
}

fn load_config(cli: &Cli) -> Result<RegistryConfig> {
    let mut config = match &cli.config {
        Some(path) => RegistryConfig::load_from_file(path)?,
        None => RegistryConfig {
            admin: String::new(),
            storage: Default::default(),
            logging: Default::default(),
        },
    }
    .apply_env_overrides();

    if let Some(admin) = &cli.admin {
        config.admin = admin.clone();
    }
    if let Some(db) = &cli.db {
        config.storage.backend = StorageBackend::Sled;
        config.storage.path = Some(db.clone());
    }
    if config.admin.is_empty() {
        return Err(anyhow!(
            "admin account required (--admin, --config or IDENTITY_REGISTRY_ADMIN)"
        ));
    }
    Ok(config)
}

fn backend_label(config: &RegistryConfig) -> &'static str {
    match config.storage.backend {
        StorageBackend::Memory => "memory",
        StorageBackend::Sled => "sled",
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn execute<S: IdentityStore>(cli: &Cli, registry: &mut IdentityRegistry<S>) -> Result<Value> {
    match &cli.command {
        Commands::Hash { data } => Ok(json!({
            "hash": IdentityHash::digest(data.as_bytes()).to_string()
        })),
        Commands::Register { hash, metadata } => {
            let ctx = call_context(cli)?;
            let raw = raw_hash(hash)?;
            registry.register(&ctx, &raw, metadata)?;
            Ok(applied("register", hash))
        }
        Commands::UpdateMetadata {
            hash,
            metadata,
            changes,
        } => {
            let ctx = call_context(cli)?;
            let raw = raw_hash(hash)?;
            registry.update_metadata(&ctx, &raw, metadata, changes)?;
            Ok(applied("update_metadata", hash))
        }
        Commands::SetStatus {
            hash,
            status,
            changes,
        } => {
            let ctx = call_context(cli)?;
            let raw = raw_hash(hash)?;
            registry.set_status(&ctx, &raw, status, changes)?;
            Ok(applied("set_status", hash))
        }
        Commands::Verify { hash } => {
            let ctx = call_context(cli)?;
            let raw = raw_hash(hash)?;
            registry.verify(&ctx, &raw)?;
            Ok(applied("verify", hash))
        }
        Commands::Suspend { hash, reason } => {
            let ctx = call_context(cli)?;
            let raw = raw_hash(hash)?;
            registry.suspend(&ctx, &raw, reason)?;
            Ok(applied("suspend", hash))
        }
        Commands::Transfer { hash, new_owner } => {
            let ctx = call_context(cli)?;
            let raw = raw_hash(hash)?;
            let new_owner: AccountId = new_owner.parse()?;
            registry.transfer_ownership(&ctx, &raw, new_owner)?;
            Ok(applied("transfer_ownership", hash))
        }
        Commands::Show { hash } => {
            let hash = IdentityHash::from_hex(hash)?;
            Ok(match registry.get_identity(&hash)? {
                Some(record) => record_json(&hash, &record),
                None => not_found(),
            })
        }
        Commands::Owner { account } => {
            let account: AccountId = account.parse()?;
            Ok(match registry.get_identity_by_owner(&account)? {
                Some(hash) => json!({ "owner": account.to_string(), "hash": hash.to_string() }),
                None => not_found(),
            })
        }
        Commands::History { hash, seq } => {
            let hash = IdentityHash::from_hex(hash)?;
            match seq {
                Some(seq) => Ok(match registry.get_history_entry(&hash, *seq)? {
                    Some(entry) => history_json(*seq, &entry),
                    None => not_found(),
                }),
                None => {
                    let entries: Vec<Value> = registry
                        .history(&hash)?
                        .iter()
                        .zip(1u64..)
                        .map(|(entry, seq)| history_json(seq, entry))
                        .collect();
                    Ok(json!({ "hash": hash.to_string(), "entries": entries }))
                }
            }
        }
        Commands::Count { hash } => {
            let hash = IdentityHash::from_hex(hash)?;
            Ok(json!({
                "hash": hash.to_string(),
                "update_count": registry.get_update_count(&hash)?
            }))
        }
    }
}

fn call_context(cli: &Cli) -> Result<CallContext> {
    let caller = cli
        .caller
        .as_deref()
        .ok_or_else(|| anyhow!("--caller is required for this command"))?;
    let caller: AccountId = caller.parse()?;
    Ok(CallContext::new(caller, cli.height))
}

/// Decode without checking length; the registry validates it
fn raw_hash(hash: &str) -> Result<Vec<u8>> {
    hex::decode(hash.trim_start_matches("0x")).context("identity hash must be hex")
}

fn applied(operation: &str, hash: &str) -> Value {
    json!({ "ok": true, "operation": operation, "hash": hash })
}

fn not_found() -> Value {
    json!({ "found": false })
}

fn record_json(hash: &IdentityHash, record: &IdentityRecord) -> Value {
    json!({
        "found": true,
        "hash": hash.to_string(),
        "owner": record.owner.to_string(),
        "registered_at": record.registered_at,
        "metadata": record.metadata,
        "status": record.status.as_str(),
        "verified": record.verified,
    })
}

fn history_json(seq: u64, entry: &HistoryEntry) -> Value {
    json!({
        "seq": seq,
        "updated_by": entry.updated_by.to_string(),
        "timestamp": entry.timestamp,
        "changes": entry.changes,
        "previous_metadata": entry.previous_metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ippan_identity_registry::MemoryStore;

    const ADMIN: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const USER: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["identity-cli"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("valid arguments")
    }

    fn registry() -> IdentityRegistry<MemoryStore> {
        IdentityRegistry::new(MemoryStore::new(), ADMIN.parse().unwrap())
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_register_verify_and_show() {
        let mut registry = registry();
        let hash = IdentityHash::digest(b"someone").to_string();
        let hash = hash.as_str();

        let out = execute(
            &parse(&["--caller", USER, "--height", "7", "register", hash, "m1"]),
            &mut registry,
        )
        .unwrap();
        assert_eq!(out["ok"], true);

        execute(&parse(&["--caller", ADMIN, "verify", hash]), &mut registry).unwrap();

        let shown = execute(&parse(&["show", hash]), &mut registry).unwrap();
        assert_eq!(shown["status"], "verified");
        assert_eq!(shown["verified"], true);
        assert_eq!(shown["registered_at"], 7);

        let history = execute(&parse(&["history", hash]), &mut registry).unwrap();
        assert_eq!(history["entries"][0]["changes"], "Identity verified");

        let single = execute(&parse(&["history", hash, "--seq", "1"]), &mut registry).unwrap();
        assert_eq!(single["updated_by"], ADMIN);

        let owner = execute(&parse(&["owner", USER]), &mut registry).unwrap();
        assert_eq!(owner["hash"], hash);

        let count = execute(&parse(&["count", hash]), &mut registry).unwrap();
        assert_eq!(count["update_count"], 1);
    }

    #[test]
    fn test_registry_errors_surface_with_code() {
        let mut registry = registry();
        let err = execute(&parse(&["--caller", USER, "register", "abcd", "m1"]), &mut registry)
            .unwrap_err();
        let registry_err = err.downcast_ref::<RegistryError>().expect("registry error");
        assert_eq!(registry_err.code(), 100);

        let missing = IdentityHash::digest(b"nobody").to_string();
        let shown = execute(&parse(&["show", missing.as_str()]), &mut registry).unwrap();
        assert_eq!(shown["found"], false);
    }

    #[test]
    fn test_malformed_account_is_validation_error() {
        let mut registry = registry();
        let hash = IdentityHash::digest(b"someone").to_string();
        let err = execute(
            &parse(&["--caller", "not-hex", "register", hash.as_str(), "m1"]),
            &mut registry,
        )
        .unwrap_err();
        let registry_err = err.downcast_ref::<RegistryError>().expect("registry error");
        assert_eq!(registry_err.code(), 104);
        assert_eq!(registry_err.category(), ErrorCategory::Validation);

        execute(&parse(&["--caller", USER, "register", hash.as_str(), "m1"]), &mut registry)
            .unwrap();
        let err = execute(
            &parse(&["--caller", USER, "transfer", hash.as_str(), "abcd"]),
            &mut registry,
        )
        .unwrap_err();
        assert_eq!(err.downcast_ref::<RegistryError>().map(|e| e.code()), Some(104));
    }

    #[test]
    fn test_backend_label_follows_config() {
        let mut config = RegistryConfig::new(ADMIN.parse().unwrap());
        assert_eq!(backend_label(&config), "memory");
        config.storage.backend = StorageBackend::Sled;
        assert_eq!(backend_label(&config), "sled");
    }

    #[test]
    fn test_mutation_requires_caller() {
        let mut registry = registry();
        let hash = IdentityHash::digest(b"x").to_string();
        assert!(execute(&parse(&["verify", hash.as_str()]), &mut registry).is_err());
    }
}
