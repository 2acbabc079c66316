//! Configuration loading for the Keep provider.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `KEEP_`, producing a typed [`ProviderConfig`]. Values written in the
//! provider block ([`ProviderSettings`]) take precedence over both.

use std::{collections::BTreeMap, env, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable prefix shared by every setting.
pub const ENV_PREFIX: &str = "KEEP_";

const REDACTED: &str = "[REDACTED]";

/// Resolved provider configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ProviderConfig {
    /// Returns a redacted JSON representation (the API key is masked).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.api_key.is_some() {
            config.api_key = Some(REDACTED.to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Parsed base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.api_url).map_err(|source| ConfigError::InvalidApiUrl {
            value: self.api_url.clone(),
            reason: source.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidApiUrl {
                value: self.api_url.clone(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout {
                value: self.timeout_secs.to_string(),
            });
        }
        Ok(())
    }
}

/// A provider-block value as the plugin framework hands it over.
///
/// `Unknown` marks a value that will only be known after apply, such as an
/// attribute computed from another resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigValue<T> {
    #[default]
    Null,
    Unknown,
    Known(T),
}

impl<T> ConfigValue<T> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, ConfigValue::Unknown)
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            ConfigValue::Known(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for ConfigValue<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(ConfigValue::Null, ConfigValue::Known)
    }
}

/// Attributes of the `provider "keep"` block.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: ConfigValue<String>,
    pub api_url: ConfigValue<String>,
}

impl ProviderSettings {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = ConfigValue::Known(key.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = ConfigValue::Known(url.into());
        self
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error(
        "unknown value for {attribute}: the provider cannot be configured until {attribute} is known; set it statically or via {env_var}"
    )]
    UnknownValue {
        attribute: &'static str,
        env_var: &'static str,
    },
    #[error("invalid api url '{value}': {reason}")]
    InvalidApiUrl { value: String, reason: String },
    #[error("request timeout must be a positive number of seconds, got '{value}'")]
    InvalidTimeout { value: String },
}

impl ConfigError {
    pub fn attribute(&self) -> Option<&'static str> {
        match self {
            ConfigError::UnknownValue { attribute, .. } => Some(attribute),
            ConfigError::InvalidApiUrl { .. } => Some("api_url"),
            _ => None,
        }
    }
}

/// Loads configuration using layered `.env` files and `KEEP_*` env vars.
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

    /// Loads configuration from the environment alone.
    pub fn load(&self) -> Result<ProviderConfig, ConfigError> {
        let config = self.load_layered()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the provider block against the environment.
    ///
    /// Unknown values fail here, before any resource touches the network.
    pub fn resolve(&self, settings: &ProviderSettings) -> Result<ProviderConfig, ConfigError> {
        if settings.api_key.is_unknown() {
            return Err(ConfigError::UnknownValue {
                attribute: "api_key",
                env_var: "KEEP_API_KEY",
            });
        }
        if settings.api_url.is_unknown() {
            return Err(ConfigError::UnknownValue {
                attribute: "api_url",
                env_var: "KEEP_API_URL",
            });
        }

        let mut config = self.load_layered()?;
        if let Some(key) = settings.api_key.known().filter(|k| !k.is_empty()) {
            config.api_key = Some(key.clone());
        }
        if let Some(url) = settings.api_url.known().filter(|u| !u.is_empty()) {
            config.api_url = url.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn load_layered(&self) -> Result<ProviderConfig, ConfigError> {
        let mut layered = BTreeMap::new();
        self.merge_dotenv(self.base_dir.join(".env"), &mut layered)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut layered)?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let api_key = layered.remove("API_KEY").filter(|v| !v.is_empty());
        let api_url = layered
            .remove("API_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_url);
        let timeout_secs = match layered.remove("TIMEOUT_SECS").filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout { value: raw.clone() })?,
            None => default_timeout_secs(),
        };
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);

        Ok(ProviderConfig {
            api_key,
            api_url,
            timeout_secs,
            log_level,
            log_format,
        })
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
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
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

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}
