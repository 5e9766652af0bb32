//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TABLE_STORE_URL` - Base URL of the hosted table-store (e.g. `https://abc.example.co`)
//! - `TABLE_STORE_ANON_KEY` - Public (anon) API key, high entropy
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `CACHE_DIR` - Directory for the persistent cache tier (unset: memory only)
//! - `CACHE_MEMORY_TTL_SECS` - Memory tier TTL (default: 300)
//! - `CACHE_PERSISTENT_TTL_SECS` - Persistent tier TTL (default: 86400)
//! - `CACHE_MAX_ITEMS` - Memory tier capacity (default: 100)
//! - `CACHE_SWEEP_INTERVAL_SECS` - Sweeper period (default: 600)
//! - `CACHE_SWEEP_MAX_AGE_SECS` - Sweeper age threshold (default: 1800)
//! - `REMOTE_TIMEOUT_SECS` - Table-store request timeout (default: 15)
//! - `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID` - Order notifications (both or neither)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::cache::CacheSettings;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(15);

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Hosted table-store connection
    pub table_store: TableStoreConfig,
    /// Product cache tuning
    pub cache: CacheConfig,
    /// Order notifications (disabled when unset)
    pub telegram: Option<TelegramConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Hosted table-store connection settings.
///
/// Implements `Debug` manually to redact the key.
#[derive(Clone)]
pub struct TableStoreConfig {
    /// Base URL, always ending in `/`
    pub url: Url,
    /// Anon API key
    pub anon_key: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for TableStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStoreConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Product cache settings.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Persistent tier directory; `None` disables the tier
    pub dir: Option<PathBuf>,
    pub settings: CacheSettings,
}

/// Telegram bot settings for order notifications.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_parsed::<IpAddr>("STOREFRONT_HOST", "127.0.0.1")?;
        let port = get_env_parsed::<u16>("STOREFRONT_PORT", "3000")?;

        Ok(Self {
            host,
            port,
            table_store: TableStoreConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            telegram: TelegramConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Defaults for everything except the table-store connection.
    #[must_use]
    pub fn new(table_store: TableStoreConfig) -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            table_store,
            cache: CacheConfig::default(),
            telegram: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl TableStoreConfig {
    /// Build a config with the default timeout. The key is not validated.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `url` is not an absolute URL.
    pub fn new(url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            url: parse_base_url("TABLE_STORE_URL", url)?,
            anon_key: SecretString::from(anon_key.to_string()),
            timeout: DEFAULT_REMOTE_TIMEOUT,
        })
    }

    /// Load from `TABLE_STORE_URL`, `TABLE_STORE_ANON_KEY` and
    /// `REMOTE_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = parse_base_url("TABLE_STORE_URL", &get_required_env("TABLE_STORE_URL")?)?;
        let anon_key = get_validated_secret("TABLE_STORE_ANON_KEY")?;
        let timeout = get_duration_secs("REMOTE_TIMEOUT_SECS", DEFAULT_REMOTE_TIMEOUT)?;
        Ok(Self {
            url,
            anon_key,
            timeout,
        })
    }
}

impl CacheConfig {
    /// Load from the `CACHE_*` variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = CacheSettings::default();
        Ok(Self {
            dir: get_optional_env("CACHE_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            settings: CacheSettings {
                memory_ttl: get_duration_secs("CACHE_MEMORY_TTL_SECS", defaults.memory_ttl)?,
                persistent_ttl: get_duration_secs(
                    "CACHE_PERSISTENT_TTL_SECS",
                    defaults.persistent_ttl,
                )?,
                max_items: get_env_parsed("CACHE_MAX_ITEMS", &defaults.max_items.to_string())?,
                sweep_interval: get_duration_secs(
                    "CACHE_SWEEP_INTERVAL_SECS",
                    defaults.sweep_interval,
                )?,
                sweep_max_age: get_duration_secs(
                    "CACHE_SWEEP_MAX_AGE_SECS",
                    defaults.sweep_max_age,
                )?,
            },
        })
    }
}

impl TelegramConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        match (
            get_optional_env("TELEGRAM_BOT_TOKEN"),
            get_optional_env("TELEGRAM_CHAT_ID"),
        ) {
            (None, None) => Ok(None),
            (Some(_), Some(chat_id)) => Ok(Some(Self {
                bot_token: get_validated_secret("TELEGRAM_BOT_TOKEN")?,
                chat_id,
            })),
            (Some(_), None) => Err(ConfigError::MissingEnvVar("TELEGRAM_CHAT_ID".to_string())),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar(
                "TELEGRAM_BOT_TOKEN".to_string(),
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get and parse an environment variable, falling back to `default`.
fn get_env_parsed<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Get a duration given in whole seconds.
fn get_duration_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = get_env_parsed::<u64>(key, &default.as_secs().to_string())?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse an absolute base URL and make sure it ends in `/` so relative joins
/// keep any path prefix.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real keys are long random strings)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the provider dashboard."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
