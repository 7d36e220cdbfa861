//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the backend base URL, HTTP timeouts, the token refresh leeway,
//! the token storage backend and the last used username.
//!
//! Configuration is stored at `~/.config/clims/config.json`. Individual
//! settings can be overridden from the environment (see [`Config::apply_env`]).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "clims";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Port the backend listens on in a local development setup
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Refresh proactively when the access token has less than this left.
const DEFAULT_REFRESH_LEEWAY_SECS: i64 = 60;

/// Access token lifetime assumed when neither the response nor the token says.
const DEFAULT_ACCESS_TTL_SECS: i64 = 900;

pub const ENV_API_BASE: &str = "CLIMS_API_BASE";
pub const ENV_REQUEST_TIMEOUT: &str = "CLIMS_REQUEST_TIMEOUT_SECS";
pub const ENV_STORAGE: &str = "CLIMS_STORAGE";

/// Where the credential is persisted between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" | "keychain" => Ok(StorageBackend::Keyring),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub refresh_leeway_secs: i64,
    pub default_access_ttl_secs: i64,
    pub storage: StorageBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            refresh_leeway_secs: DEFAULT_REFRESH_LEEWAY_SECS,
            default_access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            storage: StorageBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Config pointing at a specific backend, everything else default
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `CLIMS_*` environment overrides. Malformed values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(base) = var(ENV_API_BASE) {
            if !base.trim().is_empty() {
                self.api_base_url = base.trim().to_string();
            }
        }
        if let Some(raw) = var(ENV_REQUEST_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_REQUEST_TIMEOUT),
            }
        }
        if let Some(raw) = var(ENV_STORAGE) {
            match raw.parse() {
                Ok(storage) => self.storage = storage,
                Err(e) => warn!(error = %e, "Ignoring invalid {}", ENV_STORAGE),
            }
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn refresh_leeway(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.refresh_leeway_secs.max(0)).unwrap_or(chrono::Duration::MAX)
    }

    pub fn default_access_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.default_access_ttl_secs.max(1)).unwrap_or(chrono::Duration::MAX)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// `~/.cache/clims`; independent of the loaded settings so logging can start first
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
