//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub uploads: UploadConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_body_size() -> usize {
    20 * 1024 * 1024 // 20 MiB
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl ApiConfig {
    /// Body limit in whole megabytes, as shown to clients
    pub fn max_body_mb(&self) -> usize {
        self.max_body_size / (1024 * 1024)
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upload scratch space and reaper configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Parent of every `upload_*` scratch directory
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Uploads idle for longer than this are reaped
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("flightlens")
}

fn default_stale_after() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            stale_after_secs: default_stale_after(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Which profile store to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    File,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "file" => Ok(StoreBackend::File),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// Profile persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Holds `flightlens.db` or the JSON collection files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("flightlens"))
        .unwrap_or_else(|| PathBuf::from("./flightlens_data"))
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl PersistenceConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("flightlens.db")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "flightlens=info,tower_http=info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("flightlens").join("config.toml")),
            Some(PathBuf::from("/etc/flightlens/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply `FLIGHTLENS_*` overrides looked up through `var`
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // API overrides
        if let Some(host) = var("FLIGHTLENS_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("FLIGHTLENS_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
        if let Some(mb) = var("FLIGHTLENS_MAX_BODY_MB").and_then(|m| m.parse::<usize>().ok()) {
            self.api.max_body_size = mb * 1024 * 1024;
        }

        // Upload overrides
        if let Some(dir) = var("FLIGHTLENS_WORK_DIR") {
            self.uploads.work_dir = PathBuf::from(dir);
        }

        // Persistence overrides
        if let Some(store) = var("FLIGHTLENS_STORE") {
            match store.parse() {
                Ok(backend) => self.persistence.backend = backend,
                Err(e) => tracing::warn!("Ignoring FLIGHTLENS_STORE: {}", e),
            }
        }
        if let Some(dir) = var("FLIGHTLENS_DATA_DIR") {
            self.persistence.data_dir = PathBuf::from(dir);
        }

        // Logging overrides
        if let Some(level) = var("FLIGHTLENS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("FLIGHTLENS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# FlightLens Configuration
#
# Environment variables override these settings:
# - FLIGHTLENS_HOST
# - FLIGHTLENS_PORT
# - FLIGHTLENS_MAX_BODY_MB
# - FLIGHTLENS_WORK_DIR
# - FLIGHTLENS_STORE (sqlite, file or memory)
# - FLIGHTLENS_DATA_DIR
# - FLIGHTLENS_LOG_LEVEL
# - FLIGHTLENS_LOG_FORMAT

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 5000

# Largest accepted request body (bytes)
max_body_size = 20971520

[uploads]
# Scratch directory for in-flight uploads and analyzed logs
# work_dir = "/tmp/flightlens"

# Drop uploads with no activity for this long (seconds)
stale_after_secs = 3600

# How often to look for stale uploads (seconds)
sweep_interval_secs = 300

[persistence]
# Profile store: sqlite, file or memory
backend = "sqlite"

# Directory for the database or JSON files
# data_dir = "~/.local/share/flightlens"

[logging]
# Filter directives, e.g. "info" or "flightlens=debug,tower_http=info"
level = "flightlens=info,tower_http=info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.max_body_size, 20 * 1024 * 1024);
        assert_eq!(config.api.max_body_mb(), 20);
        assert_eq!(config.persistence.backend, StoreBackend::Sqlite);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.api.port, 5000);
        assert_eq!(config.uploads.stale_after_secs, 3600);
        assert_eq!(config.persistence.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("[persistence]\nbackend = \"file\"\n").unwrap();
        assert_eq!(config.persistence.backend, StoreBackend::File);
        assert_eq!(config.api.port, 5000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FLIGHTLENS_PORT", "9000"),
            ("FLIGHTLENS_MAX_BODY_MB", "5"),
            ("FLIGHTLENS_STORE", "memory"),
            ("FLIGHTLENS_WORK_DIR", "/srv/uploads"),
            ("FLIGHTLENS_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.max_body_size, 5 * 1024 * 1024);
        assert_eq!(config.persistence.backend, StoreBackend::Memory);
        assert_eq!(config.uploads.work_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_bad_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "FLIGHTLENS_PORT" => Some("not-a-port".into()),
            "FLIGHTLENS_STORE" => Some("mongo".into()),
            _ => None,
        });
        assert_eq!(config.api.port, 5000);
        assert_eq!(config.persistence.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load(Path::new("/nonexistent/flightlens.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
