//! # Application Configuration
//!
//! Layered configuration for the binary: built-in defaults, then an optional
//! TOML file, then `TICKETGRAPH_*` environment variables, then CLI flags.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! cors_origins = ["https://support.example.com"]
//!
//! [storage]
//! database = "ticketgraph.redb"
//! snapshot_key = "default"
//!
//! [engine.decay]
//! half_life_days = 14.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use ticketgraph_core::{EngineConfig, EngineError};

/// Maximum size of a configuration file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty means localhost only, `["*"]` means any.
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// redb file holding snapshots.
    pub database: PathBuf,
    /// Key the graph snapshot is stored under.
    pub snapshot_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("ticketgraph.redb"),
            snapshot_key: "default".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Parse a TOML document. Missing sections and keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| EngineError::InvalidArgument(format!("invalid config: {}", e)))?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            EngineError::Io(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(EngineError::InvalidArgument(format!(
                "config file exceeds {} bytes",
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Io(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults, or the given file, with the process environment applied.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `TICKETGRAPH_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TICKETGRAPH_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TICKETGRAPH_PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                EngineError::InvalidArgument(format!("TICKETGRAPH_PORT is not a port: {}", port))
            })?;
        }
        if let Some(database) = lookup("TICKETGRAPH_DB") {
            self.storage.database = PathBuf::from(database);
        }
        if let Some(origins) = lookup("TICKETGRAPH_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
