//! Control plane configuration.

use std::path::PathBuf;

use crate::launcher::LaunchConfig;

/// Database value that selects the in-memory run store.
pub const MEMORY_DATABASE: &str = "memory";

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_addr: String,

    /// SQLite database path, or `memory` for an ephemeral store.
    pub database: String,

    /// How runs are launched.
    pub launch: LaunchConfig,
}

impl Config {
    /// Returns true if runs are kept in memory only.
    pub fn is_in_memory(&self) -> bool {
        self.database == MEMORY_DATABASE
    }

    /// Path of the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8000".to_string(),
            database: "labrun.db".to_string(),
            launch: LaunchConfig::default(),
        }
    }
}
