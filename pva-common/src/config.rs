//! Configuration loading
//!
//! Resolution priority (highest first):
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables (`PVA_*`)
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing or malformed TOML file is never fatal: the service logs a
//! warning and starts with defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "PVA_CONFIG";

/// Compiled fallback values used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_dir: PathBuf,
    pub bind_address: String,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("pva"))
            .unwrap_or_else(|| PathBuf::from("./pva_data"));

        Self {
            data_dir,
            bind_address: "127.0.0.1:5780".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Listen address, e.g. "127.0.0.1:5780"
    #[serde(default)]
    pub bind_address: Option<String>,

    /// SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub socrata: SocrataConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is unset
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

/// Aggregation engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Maximum in-flight (query, finder) pairs
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-finder call ceiling in seconds
    #[serde(default = "default_finder_timeout_secs")]
    pub finder_timeout_secs: u64,

    /// Engine-wide deadline in seconds (0 disables)
    #[serde(default = "default_batch_deadline_secs")]
    pub batch_deadline_secs: u64,

    /// Pause between live portal lookups in the hybrid finder
    #[serde(default = "default_portal_delay_ms")]
    pub portal_delay_ms: u64,

    /// Open-data page size
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound for "fetch all" open-data pagination
    #[serde(default = "default_max_records")]
    pub max_records: u32,

    /// Finder names excluded from the registry
    #[serde(default)]
    pub disabled_finders: Vec<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            finder_timeout_secs: default_finder_timeout_secs(),
            batch_deadline_secs: default_batch_deadline_secs(),
            portal_delay_ms: default_portal_delay_ms(),
            page_size: default_page_size(),
            max_records: default_max_records(),
            disabled_finders: Vec::new(),
        }
    }
}

impl AggregationConfig {
    pub fn finder_timeout(&self) -> Duration {
        Duration::from_secs(self.finder_timeout_secs.max(1))
    }

    pub fn batch_deadline(&self) -> Option<Duration> {
        (self.batch_deadline_secs > 0).then(|| Duration::from_secs(self.batch_deadline_secs))
    }

    pub fn portal_delay(&self) -> Duration {
        Duration::from_millis(self.portal_delay_ms)
    }
}

/// Socrata open-data portal settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocrataConfig {
    /// Sent as `X-App-Token` to raise the anonymous throttling limit
    #[serde(default)]
    pub app_token: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrency() -> usize {
    16
}

fn default_finder_timeout_secs() -> u64 {
    30
}

fn default_batch_deadline_secs() -> u64 {
    120
}

fn default_portal_delay_ms() -> u64 {
    500
}

fn default_page_size() -> u32 {
    1000
}

fn default_max_records() -> u32 {
    5000
}

impl TomlConfig {
    /// Listen address, falling back to the compiled default
    pub fn bind_address(&self) -> String {
        self.bind_address
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().bind_address)
    }

    /// Database file, falling back to `<data_dir>/pva.db`
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().data_dir.join("pva.db"))
    }

    /// Overlay `PVA_*` environment variables onto file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("PVA_BIND_ADDRESS") {
            self.bind_address = Some(addr);
        }
        if let Ok(path) = std::env::var("PVA_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var("PVA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(token) = std::env::var("PVA_SOCRATA_APP_TOKEN") {
            if !token.trim().is_empty() {
                self.socrata.app_token = Some(token);
            }
        }
        if let Ok(value) = std::env::var("PVA_MAX_CONCURRENCY") {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => self.aggregation.max_concurrency = n,
                _ => warn!("Ignoring invalid PVA_MAX_CONCURRENCY value: {}", value),
            }
        }
    }
}

/// Locate the config file: explicit path, then `PVA_CONFIG`, then the user config dir
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|d| d.join("pva").join("config.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with graceful degradation and env overrides applied
pub fn load_config(cli_path: Option<&Path>) -> TomlConfig {
    let mut config = match resolve_config_path(cli_path) {
        Some(path) => match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{}; continuing with defaults", e);
                TomlConfig::default()
            }
        },
        None => {
            info!("No config file found, using compiled defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides();
    config
}
