//! Registry configuration
//!
//! Loaded from a TOML file and then overridden from the environment:
//!
//! ```toml
//! admin = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
//!
//! [storage]
//! backend = "sled"
//! path = "data/identity"
//!
//! [logging]
//! level = "info"
//! ```

use crate::errors::{RegistryError, Result};
use crate::registry::IdentityRegistry;
use crate::store::{ConfiguredStore, MemoryStore, SledStore};
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const ENV_ADMIN: &str = "IDENTITY_REGISTRY_ADMIN";
pub const ENV_DB_PATH: &str = "IDENTITY_REGISTRY_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "IDENTITY_REGISTRY_LOG_LEVEL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Hex account id of the admin identity
    pub admin: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database directory, required for the sled backend
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RegistryConfig {
    /// In-memory configuration for the given admin
    pub fn new(admin: AccountId) -> Self {
        Self {
            admin: admin.to_string(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RegistryError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading registry configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Apply `IDENTITY_REGISTRY_*` environment overrides
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(admin) = lookup(ENV_ADMIN) {
            self.admin = admin;
        }
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.storage.backend = StorageBackend::Sled;
            self.storage.path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        self
    }

    pub fn admin_account(&self) -> Result<AccountId> {
        self.admin
            .parse()
            .map_err(|e| RegistryError::Config(format!("admin: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.admin_account()?;
        if self.storage.backend == StorageBackend::Sled && self.storage.path.is_none() {
            return Err(RegistryError::Config(
                "sled backend requires storage.path".to_string(),
            ));
        }
        Ok(())
    }

    /// Open the configured store and wrap it in a registry
    pub fn open_registry(&self) -> Result<IdentityRegistry<ConfiguredStore>> {
        self.validate()?;
        let store = match (self.storage.backend, &self.storage.path) {
            (StorageBackend::Sled, Some(path)) => ConfiguredStore::Sled(SledStore::open(path)?),
            _ => ConfiguredStore::Memory(MemoryStore::new()),
        };
        Ok(IdentityRegistry::new(store, self.admin_account()?))
    }
}
