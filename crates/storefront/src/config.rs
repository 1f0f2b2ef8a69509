//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STRIPE_SECRET_KEY` - Stripe API secret key (placeholder and entropy checked)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 8000)
//! - `STRIPE_API_BASE` - Stripe API base URL (default: <https://api.stripe.com>)
//! - `STRIPE_CURRENCY` - ISO currency for payment intents (default: usd)
//! - `STRIPE_TIMEOUT_SECS` - Request timeout for Stripe calls (default: 15)
//! - `STRIPE_VERIFY_PAYMENTS` - Check payment intents before writing orders (default: true)
//! - `CACHE_ENABLED` - Response cache on/off (default: true)
//! - `CACHE_MAX_CAPACITY` - Maximum cached entries (default: 10000)
//! - `CACHE_TTL_PRODUCTS_SECS` - Product list TTL (default: 300)
//! - `CACHE_TTL_PRODUCT_SECS` - Single product TTL (default: 300)
//! - `CACHE_TTL_COLLECTIONS_SECS` - Collection list TTL (default: 300)
//! - `CACHE_TTL_COLLECTION_SECS` - Single collection TTL (default: 300)
//! - `CACHE_TTL_USER_ORDERS_SECS` - Per-user order history TTL (default: 300)
//! - `CACHE_TTL_ADMIN_ORDERS_SECS` - Admin order list TTL (default: 120)
//! - `CART_MAX_LINE_QUANTITY` - Upper bound on one cart line's quantity (default: 99)
//! - `CORS_ALLOWED_ORIGINS` - Comma-separated browser origins allowed to call the API
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use atelier_core::CurrencyCode;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
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
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Payment processor configuration
    pub stripe: StripeConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Upper bound on the quantity of a single cart line
    pub cart_max_line_quantity: i32,
    /// Browser origins allowed by CORS (empty disables the CORS layer)
    pub cors_allowed_origins: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (server-side only)
    pub secret_key: SecretString,
    /// API base URL, overridable for a local mock
    pub api_base: String,
    /// Currency payment intents are created in
    pub currency: CurrencyCode,
    /// Request timeout; a timed-out call is treated as indeterminate
    pub timeout: Duration,
    /// Whether orders require a succeeded payment intent of the same amount
    pub verify_payments: bool,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .field("verify_payments", &self.verify_payments)
            .finish()
    }
}

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every read goes to the store
    pub enabled: bool,
    /// Maximum number of cached entries
    pub max_capacity: u64,
    /// Time-to-live per key kind
    pub ttl: CacheTtls,
}

/// Time-to-live of each kind of cached response.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub products: Duration,
    pub product: Duration,
    pub collections: Duration,
    pub collection: Duration,
    pub user_orders: Duration,
    pub admin_orders: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            products: Duration::from_secs(300),
            product: Duration::from_secs(300),
            collections: Duration::from_secs(300),
            collection: Duration::from_secs(300),
            user_orders: Duration::from_secs(300),
            admin_orders: Duration::from_secs(120),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 10_000,
            ttl: CacheTtls::default(),
        }
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

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_parsed_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = get_parsed_env("STOREFRONT_PORT", "8000")?;

        let stripe = StripeConfig::from_env()?;
        let cache = CacheConfig::from_env()?;

        let cart_max_line_quantity: i32 = get_parsed_env("CART_MAX_LINE_QUANTITY", "99")?;
        if cart_max_line_quantity < 1 {
            return Err(ConfigError::InvalidEnvVar(
                "CART_MAX_LINE_QUANTITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let cors_allowed_origins = get_optional_env("CORS_ALLOWED_ORIGINS")
            .map(|value| parse_list(&value))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            host,
            port,
            stripe,
            cache,
            cart_max_line_quantity,
            cors_allowed_origins,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// A configuration for tests: no database, a dummy Stripe key, default cache.
    #[cfg(any(test, feature = "testing"))]
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_url: SecretString::from("postgres://localhost/atelier_test"),
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            stripe: StripeConfig {
                secret_key: SecretString::from("sk_test_unused"),
                api_base: "http://127.0.0.1:1".to_string(),
                currency: CurrencyCode::USD,
                timeout: Duration::from_secs(1),
                verify_payments: true,
            },
            cache: CacheConfig::default(),
            cart_max_line_quantity: 99,
            cors_allowed_origins: Vec::new(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("STRIPE_CURRENCY", "usd");
        let currency = CurrencyCode::from_str(&currency)
            .map_err(|e| ConfigError::InvalidEnvVar("STRIPE_CURRENCY".to_string(), e))?;

        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com")
                .trim_end_matches('/')
                .to_string(),
            currency,
            timeout: Duration::from_secs(get_parsed_env("STRIPE_TIMEOUT_SECS", "15")?),
            verify_payments: get_bool_env("STRIPE_VERIFY_PAYMENTS", true)?,
        })
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secs = |key: &str, default: &str| -> Result<Duration, ConfigError> {
            Ok(Duration::from_secs(get_parsed_env(key, default)?))
        };

        Ok(Self {
            enabled: get_bool_env("CACHE_ENABLED", true)?,
            max_capacity: get_parsed_env("CACHE_MAX_CAPACITY", "10000")?,
            ttl: CacheTtls {
                products: secs("CACHE_TTL_PRODUCTS_SECS", "300")?,
                product: secs("CACHE_TTL_PRODUCT_SECS", "300")?,
                collections: secs("CACHE_TTL_COLLECTIONS_SECS", "300")?,
                collection: secs("CACHE_TTL_COLLECTION_SECS", "300")?,
                user_orders: secs("CACHE_TTL_USER_ORDERS_SECS", "300")?,
                admin_orders: secs("CACHE_TTL_ADMIN_ORDERS_SECS", "120")?,
            },
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable parsed into `T`, with a default.
fn get_parsed_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Get a boolean environment variable.
fn get_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match get_optional_env(key) {
        Some(value) => parse_bool(&value).ok_or_else(|| {
            ConfigError::InvalidEnvVar(key.to_string(), format!("not a boolean: {value}"))
        }),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, dropping empty entries.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
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
    let len = s.len() as f64;
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

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real API keys have high entropy
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
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
