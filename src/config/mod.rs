//! Configuration loading for the Ticketboard service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `TICKETBOARD_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration derived from `TICKETBOARD_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub zendesk: ZendeskConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub refresher: RefresherConfig,
}

/// Zendesk API connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ZendeskConfig {
    /// Account subdomain, i.e. the `<subdomain>` in `https://<subdomain>.zendesk.com`.
    #[serde(default = "default_zendesk_subdomain")]
    pub subdomain: String,
    /// Agent email used for basic auth (`<email>/token` username form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// API token paired with the agent email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Overrides the derived `https://<subdomain>.zendesk.com/api/v2` base.
    /// Intended for tests pointing at a mock server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Connection/request timeout shared by all Zendesk calls.
    #[serde(default = "default_zendesk_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Dataset cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CacheConfig {
    /// How long a computed dataset stays valid for a given window key.
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

/// Background cache refresher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RefresherConfig {
    #[serde(default = "default_refresh_tick_seconds")]
    pub tick_seconds: u64,
    /// Window (minutes back) the refresher keeps warm; also the default
    /// window for `GET /tickets` when the caller omits `minutes_back`.
    #[serde(default = "default_refresh_window_minutes")]
    pub window_minutes: u32,
    /// Fractional jitter applied to each tick interval (0.0..=0.5).
    #[serde(default = "default_refresh_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_zendesk_subdomain() -> String {
    "example".to_string()
}

fn default_zendesk_timeout_seconds() -> u64 {
    30
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

fn default_refresh_tick_seconds() -> u64 {
    60
}

fn default_refresh_window_minutes() -> u32 {
    5
}

fn default_refresh_jitter_factor() -> f64 {
    0.1
}

impl Default for ZendeskConfig {
    fn default() -> Self {
        Self {
            subdomain: default_zendesk_subdomain(),
            email: None,
            api_token: None,
            api_base: None,
            timeout_seconds: default_zendesk_timeout_seconds(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_refresh_tick_seconds(),
            window_minutes: default_refresh_window_minutes(),
            jitter_factor: default_refresh_jitter_factor(),
        }
    }
}

impl ZendeskConfig {
    /// Effective API base URL, honoring the test override.
    pub fn api_base(&self) -> String {
        self.api_base
            .clone()
            .unwrap_or_else(|| format!("https://{}.zendesk.com/api/v2", self.subdomain))
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("zendesk timeout must be between 1 and 300 seconds (got {value})")]
    InvalidZendeskTimeout { value: u64 },
    #[error("cache TTL must be between 1 and 86400 seconds (got {value})")]
    InvalidCacheTtl { value: u64 },
    #[error("refresh tick must be between 10 and 3600 seconds (got {value})")]
    InvalidRefreshTick { value: u64 },
    #[error("refresh window must be between 1 and 1440 minutes (got {value})")]
    InvalidRefreshWindow { value: u32 },
    #[error("refresh jitter factor must be between 0.0 and 0.5 (got {value})")]
    InvalidRefreshJitter { value: f64 },
}

impl AppConfig {
    /// Parse the configured bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Serialize the configuration with the API token masked.
    pub fn redacted_json(&self) -> Result<String, serde_json::Error> {
        let mut redacted = self.clone();
        if redacted.zendesk.api_token.is_some() {
            redacted.zendesk.api_token = Some("***".to_string());
        }
        serde_json::to_string(&redacted)
    }

    /// Validate configured bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zendesk.timeout_seconds < 1 || self.zendesk.timeout_seconds > 300 {
            return Err(ConfigError::InvalidZendeskTimeout {
                value: self.zendesk.timeout_seconds,
            });
        }

        if self.cache.ttl_seconds < 1 || self.cache.ttl_seconds > 86_400 {
            return Err(ConfigError::InvalidCacheTtl {
                value: self.cache.ttl_seconds,
            });
        }

        if self.refresher.tick_seconds < 10 || self.refresher.tick_seconds > 3_600 {
            return Err(ConfigError::InvalidRefreshTick {
                value: self.refresher.tick_seconds,
            });
        }

        if self.refresher.window_minutes < 1 || self.refresher.window_minutes > 1_440 {
            return Err(ConfigError::InvalidRefreshWindow {
                value: self.refresher.window_minutes,
            });
        }

        if self.refresher.jitter_factor < 0.0 || self.refresher.jitter_factor > 0.5 {
            return Err(ConfigError::InvalidRefreshJitter {
                value: self.refresher.jitter_factor,
            });
        }

        Ok(())
    }
}

/// Loads configuration using layered `.env` files and `TICKETBOARD_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("TICKETBOARD_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);

        let zendesk_subdomain = layered
            .remove("ZENDESK_SUBDOMAIN")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_zendesk_subdomain);
        let zendesk_email = layered.remove("ZENDESK_EMAIL").and_then(non_empty);
        let zendesk_api_token = layered.remove("ZENDESK_API_TOKEN").and_then(non_empty);
        let zendesk_api_base = layered.remove("ZENDESK_API_BASE").and_then(non_empty);
        let zendesk_timeout_seconds = layered
            .remove("ZENDESK_TIMEOUT_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_zendesk_timeout_seconds);

        let cache_ttl_seconds = layered
            .remove("CACHE_TTL_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_cache_ttl_seconds);

        let refresh_tick_seconds = layered
            .remove("REFRESH_TICK_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_refresh_tick_seconds);
        let refresh_window_minutes = layered
            .remove("REFRESH_WINDOW_MINUTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_refresh_window_minutes);
        let refresh_jitter_factor = layered
            .remove("REFRESH_JITTER_FACTOR")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_refresh_jitter_factor);

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            zendesk: ZendeskConfig {
                subdomain: zendesk_subdomain,
                email: zendesk_email,
                api_token: zendesk_api_token,
                api_base: zendesk_api_base,
                timeout_seconds: zendesk_timeout_seconds,
            },
            cache: CacheConfig {
                ttl_seconds: cache_ttl_seconds,
            },
            refresher: RefresherConfig {
                tick_seconds: refresh_tick_seconds,
                window_minutes: refresh_window_minutes,
                jitter_factor: refresh_jitter_factor,
            },
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("TICKETBOARD_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("TICKETBOARD_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
