//! Exporter configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `HUMBLE_BASE_URL` - Storefront base URL (default: `https://www.humblebundle.com`)
//! - `HUMBLE_SESSION_COOKIE` - `_simpleauth_sess` session cookie value; required
//!   for choice-page fetches, selection, and redemption
//! - `HUMBLE_CSRF_TOKEN` - CSRF token override; normally read back from the
//!   `csrf_cookie` cookie after the first page fetch
//! - `STEAM_USERDATA_URL` - Owned-apps endpoint
//!   (default: `https://store.steampowered.com/dynamicstore/userdata`)
//! - `STEAM_TIMEOUT_SECS` - Owned-apps fetch timeout (default: 5)
//! - `KEYPORTER_TIMEZONE` - IANA zone for expiry dates that carry no offset
//!   (default: `America/Los_Angeles`)
//! - `KEYPORTER_STORE_PATH` - Record store file (default: `keyporter-store.json`)

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://www.humblebundle.com";
const DEFAULT_STEAM_USERDATA_URL: &str = "https://store.steampowered.com/dynamicstore/userdata";
const DEFAULT_STEAM_TIMEOUT_SECS: u64 = 5;
const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";
const DEFAULT_STORE_PATH: &str = "keyporter-store.json";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Exporter configuration.
///
/// Implements `Debug` manually to redact the session cookie.
#[derive(Clone)]
pub struct Config {
    /// Storefront base URL, no trailing slash.
    pub base_url: String,
    /// Storefront session cookie; claim operations fail without it.
    pub session_cookie: Option<SecretString>,
    /// CSRF token override for the selection endpoint.
    pub csrf_token: Option<String>,
    /// Steam dynamicstore userdata endpoint.
    pub steam_userdata_url: String,
    /// Timeout for the owned-apps fetch.
    pub steam_timeout: Duration,
    /// Zone used for expiry dates and times that carry no explicit offset.
    pub timezone: Tz,
    /// Record store file path used by the CLI.
    pub store_path: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field(
                "session_cookie",
                &self.session_cookie.as_ref().map(|_| "[REDACTED]"),
            )
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "[REDACTED]"))
            .field("steam_userdata_url", &self.steam_userdata_url)
            .field("steam_timeout", &self.steam_timeout)
            .field("timezone", &self.timezone)
            .field("store_path", &self.store_path)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = get_env_or_default("HUMBLE_BASE_URL", DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let session_cookie = get_optional_env("HUMBLE_SESSION_COOKIE").map(SecretString::from);
        let csrf_token = get_optional_env("HUMBLE_CSRF_TOKEN");
        let steam_userdata_url =
            get_env_or_default("STEAM_USERDATA_URL", DEFAULT_STEAM_USERDATA_URL);
        let steam_timeout = get_env_or_default(
            "STEAM_TIMEOUT_SECS",
            &DEFAULT_STEAM_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidEnvVar("STEAM_TIMEOUT_SECS".to_string(), e.to_string()))?;
        let timezone = parse_timezone(&get_env_or_default("KEYPORTER_TIMEZONE", DEFAULT_TIMEZONE))?;
        let store_path = PathBuf::from(get_env_or_default("KEYPORTER_STORE_PATH", DEFAULT_STORE_PATH));

        Ok(Self {
            base_url,
            session_cookie,
            csrf_token,
            steam_userdata_url,
            steam_timeout,
            timezone,
            store_path,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_cookie: None,
            csrf_token: None,
            steam_userdata_url: DEFAULT_STEAM_USERDATA_URL.to_string(),
            steam_timeout: Duration::from_secs(DEFAULT_STEAM_TIMEOUT_SECS),
            timezone: chrono_tz::America::Los_Angeles,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>().map_err(|_| {
        ConfigError::InvalidEnvVar(
            "KEYPORTER_TIMEZONE".to_string(),
            format!("unknown IANA timezone: {name}"),
        )
    })
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
