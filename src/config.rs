use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use xuanji_core::{CacheConfig, SyncSettings};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_auto_sync_interval() -> u64 {
    900
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Server base URL (e.g., "https://sync.example.com")
    pub server_url: Option<String>,
    /// API key sent as a bearer token. Never printed.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Run incremental sync around commands and in `sync watch` (default: false)
    #[serde(default)]
    pub auto_sync: bool,
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_secs: u64,
    #[serde(flatten)]
    pub settings: SyncSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            auto_sync: false,
            auto_sync_interval_secs: default_auto_sync_interval(),
            settings: SyncSettings::default(),
        }
    }
}

impl SyncConfig {
    /// Returns true if a server URL is set. The API key is optional.
    pub fn is_configured(&self) -> bool {
        self.server_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Maximum number of cached entries
    pub cache_max_entries: ConfigValue<usize>,
    pub cache_default_ttl_secs: u64,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    cache: Option<CacheConfig>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("xuanji.db");
        let default_cache = CacheConfig::default();

        // Start with defaults
        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut cache_max_entries =
            ConfigValue::new(default_cache.max_entries, ConfigSource::Default);
        let mut cache_default_ttl_secs = default_cache.default_ttl_secs;
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(cache) = file_config.cache {
                cache_max_entries = ConfigValue::new(cache.max_entries, ConfigSource::File);
                cache_default_ttl_secs = cache.default_ttl_secs;
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("XJ_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(max_entries) = std::env::var("XJ_CACHE_MAX_ENTRIES") {
            let parsed = max_entries
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidEnv("XJ_CACHE_MAX_ENTRIES", max_entries))?;
            cache_max_entries = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        // Sync env var overrides
        if let Ok(url) = std::env::var("XJ_SYNC_URL") {
            sync.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("XJ_SYNC_API_KEY") {
            sync.api_key = Some(key);
        }

        Ok(Self {
            database_path,
            cache_max_entries,
            cache_default_ttl_secs,
            config_file,
            sync,
        })
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache_max_entries.value,
            default_ttl_secs: self.cache_default_ttl_secs,
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/xuanji/
    /// - macOS: ~/Library/Application Support/xuanji/
    /// - Windows: %APPDATA%/xuanji/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xuanji")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/xuanji/
    /// - macOS: ~/Library/Application Support/xuanji/
    /// - Windows: %APPDATA%/xuanji/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xuanji")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
