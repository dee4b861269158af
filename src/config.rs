use crate::core::db::Db;
use crate::core::{Result, SqlweaveError};
use crate::filter::ColumnDefaults;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
///
/// Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub columns: ColumnDefaults,
}

/// How to open the SQLite database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// File path, or `:memory:`
    pub path: String,
    pub foreign_keys: bool,
    /// One of DELETE, TRUNCATE, PERSIST, MEMORY, WAL, OFF
    pub journal_mode: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    /// Begin transactions with `BEGIN IMMEDIATE`
    pub immediate_transactions: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: ":memory:".to_string(),
            foreign_keys: true,
            journal_mode: None,
            busy_timeout_ms: None,
            immediate_transactions: false,
        }
    }
}

impl Config {
    /// `<config dir>/sqlweave/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlweave").join("config.toml"))
    }

    /// Opens the configured database.
    pub fn open_db(&self) -> Result<Db> {
        Db::open(&self.database)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Errors
///
/// `SqlweaveError::Io` when the file cannot be read, `SqlweaveError::Config`
/// when it is not valid configuration.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| SqlweaveError::Config(e.to_string()))
}
