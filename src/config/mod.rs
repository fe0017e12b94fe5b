//! Configuration loading for the connections client.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `CONNECT_`, producing a typed [`ClientConfig`].

use std::{collections::BTreeMap, env, fmt, path::PathBuf, time::Duration};

use serde::{Serialize, Serializer};
use thiserror::Error;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment prefix shared by every configuration key.
const ENV_PREFIX: &str = "CONNECT_";

/// Lowest polling interval the client will ever use against the status endpoint.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// Highest polling interval accepted from configuration.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(MAX_POLL_INTERVAL_MS);

/// Upper bound for activation timeouts taken from configuration or the command line.
pub const MAX_ACTIVATION_TIMEOUT_SECONDS: u64 = 3_600;

const MAX_POLL_INTERVAL_MS: u64 = 60_000;
const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 300;

/// API key for the connected-accounts service, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key; surrounding whitespace is stripped.
    pub fn new<S: Into<String>>(key: S) -> Self {
        let raw: String = key.into();
        Self(raw.trim().to_string())
    }

    /// Borrow the secret for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

/// Client configuration derived from `CONNECT_*` environment variables.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClientConfig {
    pub profile: String,
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,
    pub poll_interval_ms: u64,
    pub activation_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_base: default_api_base(),
            api_key: None,
            poll_interval_ms: default_poll_interval_ms(),
            activation_timeout_seconds: default_activation_timeout_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl ClientConfig {
    /// Parsed base URL of the remote API.
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        let parsed = Url::parse(&self.api_base).map_err(|source| ConfigError::InvalidApiBase {
            value: self.api_base.clone(),
            reason: source.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidApiBase {
                value: self.api_base.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(parsed)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn activation_timeout(&self) -> Duration {
        Duration::from_secs(self.activation_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Returns a pretty JSON representation with secrets redacted.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_base_url()?;

        // The test profile talks to local mocks that ignore the key
        if self.profile != "test" && self.api_key.as_ref().is_none_or(ApiKey::is_empty) {
            return Err(ConfigError::MissingApiKey);
        }

        let min_poll_ms = MIN_POLL_INTERVAL.as_millis() as u64;
        if self.poll_interval_ms < min_poll_ms || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::InvalidPollInterval {
                value: self.poll_interval_ms,
                min: min_poll_ms,
                max: MAX_POLL_INTERVAL_MS,
            });
        }

        if self.activation_timeout_seconds == 0
            || self.activation_timeout_seconds > MAX_ACTIVATION_TIMEOUT_SECONDS
        {
            return Err(ConfigError::InvalidActivationTimeout {
                value: self.activation_timeout_seconds,
            });
        }

        if self.request_timeout_seconds == 0
            || self.request_timeout_seconds > MAX_REQUEST_TIMEOUT_SECONDS
        {
            return Err(ConfigError::InvalidRequestTimeout {
                value: self.request_timeout_seconds,
            });
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_base() -> String {
    "https://backend.composio.dev/api".to_string()
}

fn default_poll_interval_ms() -> u64 {
    3_000 // 3 seconds
}

fn default_activation_timeout_seconds() -> u64 {
    60
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("API key is missing; set CONNECT_API_KEY environment variable")]
    MissingApiKey,
    #[error("invalid api base '{value}': {reason}")]
    InvalidApiBase { value: String, reason: String },
    #[error("invalid value '{value}' for {key}: expected an unsigned integer")]
    InvalidNumber { key: String, value: String },
    #[error("poll interval must be between {min} and {max} milliseconds, got {value}")]
    InvalidPollInterval { value: u64, min: u64, max: u64 },
    #[error("activation timeout must be between 1 and 3600 seconds, got {value}")]
    InvalidActivationTimeout { value: u64 },
    #[error("request timeout must be between 1 and 300 seconds, got {value}")]
    InvalidRequestTimeout { value: u64 },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
}

/// Loads configuration using layered `.env` files and `CONNECT_*` env vars.
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

    /// Loads and validates configuration. The process environment wins over every file.
    pub fn load(&self) -> Result<ClientConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_base = take_string(&mut layered, "API_BASE").unwrap_or_else(default_api_base);
        let api_key = take_string(&mut layered, "API_KEY").map(ApiKey::new);
        let poll_interval_ms =
            take_u64(&mut layered, "POLL_INTERVAL_MS")?.unwrap_or_else(default_poll_interval_ms);
        let activation_timeout_seconds = take_u64(&mut layered, "ACTIVATION_TIMEOUT_SECONDS")?
            .unwrap_or_else(default_activation_timeout_seconds);
        let request_timeout_seconds = take_u64(&mut layered, "REQUEST_TIMEOUT_SECONDS")?
            .unwrap_or_else(default_request_timeout_seconds);
        let log_level = take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take_string(&mut layered, "LOG_FORMAT")
            .map(|format| format.to_lowercase())
            .unwrap_or_else(default_log_format);

        let config = ClientConfig {
            profile,
            api_base,
            api_key,
            poll_interval_ms,
            activation_timeout_seconds,
            request_timeout_seconds,
            log_level,
            log_format,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .filter(|v| !v.is_empty())
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

fn take_string(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_u64(layered: &mut BTreeMap<String, String>, key: &str) -> Result<Option<u64>, ConfigError> {
    match take_string(layered, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: format!("{ENV_PREFIX}{key}"),
                value: raw,
            }),
    }
}
