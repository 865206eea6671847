//! # Configuration
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. `drivetrack.toml` (the `--config` path, or `./drivetrack.toml` if present)
//! 2. Environment variables
//! 3. CLI flags (applied by the `cli` module)
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [storage]
//! backend = "redb"        # or "file"
//! database = "drivetrack.db"
//!
//! [security]
//! cors_origins = "http://localhost:3000"
//! rate_limit = 100        # requests per second, 0 disables
//! api_key = "change-me"
//! ```
//!
//! ## Environment Variables
//!
//! - `DRIVETRACK_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all
//! - `DRIVETRACK_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `DRIVETRACK_API_KEY`: If set, requires Bearer token authentication

use drivetrack_core::TrackError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "drivetrack.toml";

/// Default rate limit: 100 requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Maximum accepted config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// CONFIG SECTIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Where records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// ACID database file (redb).
    #[default]
    Redb,
    /// Binary snapshot file, loaded into memory and written back after changes.
    File,
}

impl Backend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Redb => "redb",
            Backend::File => "file",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: Backend,
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redb,
            database: PathBuf::from("drivetrack.db"),
        }
    }
}

/// HTTP security settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// Comma-separated origins, "*" for any. `None` means localhost only.
    pub cors_origins: Option<String>,
    /// Requests per second. `None` means the default, 0 disables limiting.
    pub rate_limit: Option<u32>,
    /// Bearer key. `None` or empty disables authentication.
    pub api_key: Option<String>,
}

impl SecurityConfig {
    /// Settings from the environment alone.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Replace every field whose environment variable is set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(origins) = std::env::var("DRIVETRACK_CORS_ORIGINS") {
            self.cors_origins = Some(origins);
        }
        if let Some(limit) = std::env::var("DRIVETRACK_RATE_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.rate_limit = Some(limit);
        }
        if let Ok(key) = std::env::var("DRIVETRACK_API_KEY") {
            self.api_key = Some(key);
        }
        self
    }

    #[must_use]
    pub fn rate_limit(&self) -> u32 {
        self.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT)
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, TrackError> {
        toml::from_str(text).map_err(|e| TrackError::Serialization(format!("Invalid config: {}", e)))
    }

    /// Load the config file and apply environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `./drivetrack.toml` is read
    /// when present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, TrackError> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        };

        let mut config = match file {
            Some(p) => {
                tracing::debug!("Loading config from {:?}", p);
                Self::read_file(&p)?
            }
            None => Self::default(),
        };
        config.security = config.security.with_env_overrides();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, TrackError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| TrackError::Io(format!("Cannot read config '{}': {}", path.display(), e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TrackError::Io(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrackError::Io(format!("Cannot read config '{}': {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::from_toml_str("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, Backend::Redb);
        assert_eq!(config.security.rate_limit(), DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn sections_parse() {
        let config = Config::from_toml_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [storage]
            backend = "file"
            database = "drives.snapshot"

            [security]
            rate_limit = 0
            api_key = ""
            "#,
        )
        .expect("parse");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.backend, Backend::File);
        assert_eq!(config.storage.database, PathBuf::from("drives.snapshot"));
        assert_eq!(config.security.rate_limit(), 0);
        assert_eq!(config.security.api_key(), None);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(matches!(
            Config::from_toml_str("[server]\nhostname = \"x\""),
            Err(TrackError::Serialization(_))
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(TrackError::Io(_))));
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("drivetrack.toml");
        std::fs::write(&path, "[server]\nport = 7070\n").expect("write");

        let config = Config::load(Some(&path)).expect("load");
        assert_eq!(config.server.port, 7070);
    }
}
