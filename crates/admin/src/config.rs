//! Admin configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ADMIN_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `ADMIN_BASE_URL` - Public URL for the back office
//! - `ADMIN_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `ADMIN_HOST` - Bind address (default: 127.0.0.1)
//! - `ADMIN_PORT` - Listen port (default: 3001)
//! - `STORE_NAME` - Name printed on kitchen tickets and page titles (default: Pizzaria)
//! - `REALTIME_DEBOUNCE_MS` - Window collapsing change bursts into one reload (default: 300)
//! - `PROVIDER_TIMEOUT_SECS` - Timeout for fiscal and WhatsApp API calls (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 1.0)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text
//!
//! Fiscal and WhatsApp API credentials are not read here; they live in the
//! `fiscal_config` and `notification_config` rows and are edited in settings.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use pizzaria_core::secret;

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

/// Admin application configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the back office
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Store name printed on tickets
    pub store_name: String,
    /// Bursts of change events inside this window become one reload
    pub realtime_debounce: Duration,
    /// Timeout for outbound provider calls
    pub provider_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. `production`, `staging`)
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// Emit JSON logs instead of text
    pub json_logs: bool,
}

impl AdminConfig {
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

        let database_url = get_database_url("ADMIN_DATABASE_URL")?;
        let host = get_env_or_default("ADMIN_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("ADMIN_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ADMIN_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("ADMIN_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("ADMIN_BASE_URL".to_string(), e.to_string())
        })?;
        let session_secret = session_secret(
            "ADMIN_SESSION_SECRET",
            get_required_env("ADMIN_SESSION_SECRET")?,
        )?;

        let realtime_debounce = Duration::from_millis(parse_count(
            "REALTIME_DEBOUNCE_MS",
            &get_env_or_default("REALTIME_DEBOUNCE_MS", "300"),
        )?);
        let provider_timeout = Duration::from_secs(parse_count(
            "PROVIDER_TIMEOUT_SECS",
            &get_env_or_default("PROVIDER_TIMEOUT_SECS", "15"),
        )?);

        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            store_name: get_env_or_default("STORE_NAME", "Pizzaria"),
            realtime_debounce,
            provider_timeout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
            sentry_traces_sample_rate,
            json_logs: get_optional_env("LOG_FORMAT").is_some_and(|v| v == "json"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Local configuration for unit tests.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            database_url: SecretString::from("postgres://localhost/pizzaria"),
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3001,
            base_url: "http://localhost:3001".to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            store_name: "Pizzaria".to_string(),
            realtime_debounce: Duration::from_millis(300),
            provider_timeout: Duration::from_secs(15),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
            json_logs: false,
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

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a non-negative whole-number setting.
fn parse_count(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Accept `value` as the session secret named `key`, refusing weak values.
fn session_secret(key: &str, value: String) -> Result<SecretString, ConfigError> {
    secret::check(&value)
        .map_err(|e| ConfigError::InsecureSecret(key.to_string(), e.to_string()))?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_session_secret_is_refused() {
        let err = session_secret("ADMIN_SESSION_SECRET", "changeme".repeat(5)).unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(key, _) if key == "ADMIN_SESSION_SECRET"));
        let strong = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%".to_string();
        assert!(session_secret("ADMIN_SESSION_SECRET", strong).is_ok());
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("REALTIME_DEBOUNCE_MS", "300").unwrap(), 300);
        assert_eq!(parse_count("REALTIME_DEBOUNCE_MS", " 0 ").unwrap(), 0);
        assert!(matches!(
            parse_count("REALTIME_DEBOUNCE_MS", "-5"),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "REALTIME_DEBOUNCE_MS"
        ));
    }

    #[test]
    fn test_socket_addr_and_secure_flag() {
        let config = AdminConfig::for_tests();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3001");
        assert!(!config.is_secure());
        assert_eq!(config.realtime_debounce, Duration::from_millis(300));

        let secure = AdminConfig {
            base_url: "https://admin.pizzaria.example".to_string(),
            ..AdminConfig::for_tests()
        };
        assert!(secure.is_secure());
    }
}
