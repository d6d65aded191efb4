//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `STRIPE_SECRET_KEY` - Payment processor API key
//! - `STRIPE_WEBHOOK_SECRET` - Signing secret for payment webhooks
//! - `STRIPE_SHIPPING_RATE_ID` - The single shipping rate offered at checkout
//! - `CMS_PROJECT_ID` - Headless CMS project identifier
//! - `CMS_DATASET` - CMS dataset name (e.g. `production`)
//! - `CMS_API_TOKEN` - CMS token with read + create permissions
//! - `CMS_WEBHOOK_SECRET` - Signing secret for CMS document webhooks
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD` - Outbound mail relay
//! - `EMAIL_FROM` - From address for transactional mail
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STRIPE_ALLOWED_COUNTRIES` - Comma-separated shipping countries (default: US)
//! - `STRIPE_API_BASE` - Payment API base URL (default: <https://api.stripe.com>)
//! - `CMS_API_VERSION` - CMS API version date (default: 2024-01-01)
//! - `CMS_API_BASE` - CMS API base URL (default: `https://<project>.api.sanity.io`)
//! - `SMTP_PORT` - Relay port (default: 587)
//! - `TRACKING_URL_BASE` - Carrier tracking URL prefix (default: USPS)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// USPS tracking page; the tracking number is appended URL-encoded.
pub const DEFAULT_TRACKING_URL_BASE: &str = "https://tools.usps.com/go/TrackConfirmAction?tLabels=";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
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
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront, without trailing slash
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Payment processor configuration
    pub stripe: StripeConfig,
    /// Headless CMS configuration
    pub cms: CmsConfig,
    /// Outbound email configuration
    pub email: EmailConfig,
    /// Carrier tracking URL prefix
    pub tracking_url_base: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry performance trace sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Payment processor configuration.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// API base URL
    pub api_base: String,
    /// Secret API key (server-side only)
    pub secret_key: SecretString,
    /// Webhook signing secret
    pub webhook_secret: SecretString,
    /// The single shipping rate attached to every session
    pub shipping_rate_id: String,
    /// ISO country codes shipping addresses may be in
    pub allowed_countries: Vec<String>,
}

/// Headless CMS configuration.
#[derive(Debug, Clone)]
pub struct CmsConfig {
    /// API base URL
    pub api_base: String,
    /// Project identifier
    pub project_id: String,
    /// Dataset name
    pub dataset: String,
    /// API version date, e.g. `2024-01-01`
    pub api_version: String,
    /// Token used for queries and review creation
    pub api_token: SecretString,
    /// Webhook signing secret
    pub webhook_secret: SecretString,
}

/// SMTP configuration for transactional email.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Relay host
    pub smtp_host: String,
    /// Relay port
    pub smtp_port: u16,
    /// Relay username
    pub smtp_username: String,
    /// Relay password
    pub smtp_password: SecretString,
    /// From address, e.g. `Roastery <orders@roastery.example>`
    pub from_address: String,
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

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_owned(), e.to_string())
        })?;
        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            stripe: StripeConfig::from_env()?,
            cms: CmsConfig::from_env()?,
            email: EmailConfig::from_env()?,
            tracking_url_base: get_env_or_default("TRACKING_URL_BASE", DEFAULT_TRACKING_URL_BASE),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should be marked `Secure`.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let allowed_countries = parse_country_list(&get_env_or_default(
            "STRIPE_ALLOWED_COUNTRIES",
            "US",
        ))
        .ok_or_else(|| {
            ConfigError::InvalidEnvVar(
                "STRIPE_ALLOWED_COUNTRIES".to_owned(),
                "expected comma-separated two-letter country codes".to_owned(),
            )
        })?;

        Ok(Self {
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            shipping_rate_id: get_required_env("STRIPE_SHIPPING_RATE_ID")?,
            allowed_countries,
        })
    }
}

impl CmsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let project_id = get_required_env("CMS_PROJECT_ID")?;
        let api_base = get_optional_env("CMS_API_BASE")
            .unwrap_or_else(|| format!("https://{project_id}.api.sanity.io"));

        Ok(Self {
            api_base,
            project_id,
            dataset: get_required_env("CMS_DATASET")?,
            api_version: get_env_or_default("CMS_API_VERSION", "2024-01-01"),
            api_token: get_validated_secret("CMS_API_TOKEN")?,
            webhook_secret: get_validated_secret("CMS_WEBHOOK_SECRET")?,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_owned()))
}

/// Get a required environment variable as a secret, without strength checks.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    get_required_env(key).map(SecretString::from)
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_owned()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_owned())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
}

/// Parse `"US, ca"` into `["US", "CA"]`. `None` if any entry is not two letters.
fn parse_country_list(raw: &str) -> Option<Vec<String>> {
    let countries: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_ascii_uppercase)
        .collect();

    let valid = !countries.is_empty()
        && countries
            .iter()
            .all(|code| code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()));
    valid.then_some(countries)
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::storefront_config as sample_config;

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-stripe-key-here", "STRIPE_SECRET_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        assert!(validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_validate_session_secret_length() {
        assert!(validate_session_secret(&SecretString::from("short"), "S").is_err());
        assert!(validate_session_secret(&SecretString::from("a".repeat(32)), "S").is_ok());
    }

    #[test]
    fn test_parse_country_list() {
        assert_eq!(
            parse_country_list("us, ca"),
            Some(vec!["US".to_owned(), "CA".to_owned()])
        );
        assert_eq!(parse_country_list(""), None);
        assert_eq!(parse_country_list("USA"), None);
    }

    #[test]
    fn test_socket_addr_and_https() {
        let config = sample_config();
        assert_eq!(config.socket_addr().port(), 3000);
        assert!(config.is_https());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug_output = format!("{:?}", sample_config());
        assert!(debug_output.contains("shr_standard"));
        assert!(!debug_output.contains("sk_live_Zq8vN2pLr4Tx"));
        assert!(!debug_output.contains("whsec_Hk3mQ9wPz7"));
        assert!(!debug_output.contains("smtpPassValue"));
    }
}
