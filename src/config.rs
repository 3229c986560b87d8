use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ticketmaster: TicketmasterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketmasterConfig {
    /// Pause between per-city requests so we stay under the provider's rate limit.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_cities")]
    pub cities: Vec<String>,
}

impl Default for TicketmasterConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            country_code: default_country_code(),
            timeout_seconds: default_timeout_seconds(),
            page_size: default_page_size(),
            cities: default_cities(),
        }
    }
}

fn default_delay_ms() -> u64 {
    250
}

fn default_country_code() -> String {
    "ES".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_page_size() -> u32 {
    50
}

fn default_cities() -> Vec<String> {
    vec![
        "Madrid".to_string(),
        "Barcelona".to_string(),
        "Valencia".to_string(),
        "Sevilla".to_string(),
    ]
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist. A present-but-invalid file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
