//! Store and backend configuration.
//!
//! Every value has a default; `from_env` overlays `OBJDB_*` variables and
//! `ObjdbConfig::load_from_file` reads the same structure from YAML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },

    #[error("Invalid table name: {0:?}")]
    InvalidIdentifier(String),

    #[error("{0} must be at least 1")]
    ZeroBatchSize(&'static str),
}

fn default_upsert_batch_size() -> usize {
    20
}

fn default_bulk_batch_size() -> usize {
    1000
}

fn default_index_batch_size() -> usize {
    500
}

fn default_objs_table() -> String {
    "objs".to_string()
}

fn default_fields_table() -> String {
    "obj_fields".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub upsert_batch_size: usize,
    pub update_batch_size: usize,
    pub delete_batch_size: usize,
    pub cleanup_batch_size: usize,
    pub index_batch_size: usize,
    pub objs_table: String,
    pub fields_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            upsert_batch_size: default_upsert_batch_size(),
            update_batch_size: default_bulk_batch_size(),
            delete_batch_size: default_bulk_batch_size(),
            cleanup_batch_size: default_bulk_batch_size(),
            index_batch_size: default_index_batch_size(),
            objs_table: default_objs_table(),
            fields_table: default_fields_table(),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            upsert_batch_size: env_or("OBJDB_UPSERT_BATCH_SIZE", defaults.upsert_batch_size)?,
            update_batch_size: env_or("OBJDB_UPDATE_BATCH_SIZE", defaults.update_batch_size)?,
            delete_batch_size: env_or("OBJDB_DELETE_BATCH_SIZE", defaults.delete_batch_size)?,
            cleanup_batch_size: env_or("OBJDB_CLEANUP_BATCH_SIZE", defaults.cleanup_batch_size)?,
            index_batch_size: env_or("OBJDB_INDEX_BATCH_SIZE", defaults.index_batch_size)?,
            objs_table: env_or("OBJDB_OBJS_TABLE", defaults.objs_table)?,
            fields_table: env_or("OBJDB_FIELDS_TABLE", defaults.fields_table)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("upsert_batch_size", self.upsert_batch_size),
            ("update_batch_size", self.update_batch_size),
            ("delete_batch_size", self.delete_batch_size),
            ("cleanup_batch_size", self.cleanup_batch_size),
            ("index_batch_size", self.index_batch_size),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(ConfigError::ZeroBatchSize(name));
        }
        validate_identifier(&self.objs_table)?;
        validate_identifier(&self.fields_table)?;
        Ok(())
    }
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl SqliteConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            database_url: env_or("OBJDB_DATABASE_URL", defaults.database_url)?,
            max_connections: env_or("OBJDB_MAX_CONNECTIONS", defaults.max_connections)?,
            acquire_timeout_secs: env_or(
                "OBJDB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout_secs,
            )?,
        })
    }

    /// An in-memory database lives as long as its single connection.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjdbConfig {
    pub store: StoreConfig,
    pub sqlite: SqliteConfig,
}

impl ObjdbConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;

        let config: ObjdbConfig = serde_yaml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config YAML {}: {}", path.display(), e)
        })?;

        config.store.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store: StoreConfig::from_env()?,
            sqlite: SqliteConfig::from_env()?,
        })
    }
}

fn env_or<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Table names are interpolated into DDL and queries, so only plain
/// identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}
