//! Configuration for the harvester.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Browser session and fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Seconds to wait after navigation for client-side rendering
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Attempts per fetch before giving up
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Seconds to wait before replacing a failed session
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Pages kept in the MRU cache
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Explicit browser binary; platform default when unset
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
}

fn default_settle_secs() -> u64 {
    3
}

fn default_retry_count() -> u32 {
    2
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_cache_size() -> usize {
    3
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            retry_count: default_retry_count(),
            cooldown_secs: default_cooldown_secs(),
            cache_size: default_cache_size(),
            chrome_path: None,
        }
    }
}

impl ScraperConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "nar".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
        }
    }
}

/// Batch ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Seconds to wait before retrying a failed batch item
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Skip items failing with decode/identity errors instead of retrying them
    #[serde(default)]
    pub skip_permanent_errors: bool,
}

fn default_retry_delay_secs() -> u64 {
    60
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            skip_permanent_errors: false,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Load configuration from defaults, `config.*` and the environment
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("config")
    }

    /// Same as [`AppConfig::load`] with an explicit config file stem
    pub fn load_from(file: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name(file).required(false))
            // Override with environment variables (KEIBA_SCRAPER__RETRY_COUNT, etc.)
            .add_source(
                config::Environment::with_prefix("KEIBA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
