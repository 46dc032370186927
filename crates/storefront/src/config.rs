//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_STATIC_DIR` - Static asset directory (default: crates/storefront/static)
//! - `PLANT_API_BASE_URL` - Plant backend base URL (default: <http://localhost:8080>)
//! - `PLANT_API_TIMEOUT_MS` - Backend request timeout (default: 5000)
//! - `IMAGE_CACHE_ENABLED` - Cache plant images locally (default: true)
//! - `IMAGE_CACHE_PATH` - `SQLite` file for the image cache (default: data/image-cache.db)
//! - `IMAGE_CACHE_TTL_SECS` - Image time-to-live (default: 604800, seven days)
//! - `IMAGE_CACHE_MAX_ENTRIES` - LRU cap (default: 100)
//! - `IMAGE_CACHE_MAX_BYTES` - Largest image body that gets cached (default: 5 MiB)
//! - `IMAGE_CACHE_SWEEP_SECS` - Expired-entry sweep interval (default: 3600)
//! - `CART_SYNC_DEBOUNCE_MS` - Cart sync debounce window (default: 500)
//! - `ORDERS_PAGE_SIZE` - Orders per page (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.1)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
    /// Plant backend configuration
    pub api: PlantApiConfig,
    /// Local image cache configuration
    pub image_cache: ImageCacheConfig,
    /// Quiet period before a cart delta is pushed to the backend
    pub cart_sync_debounce: Duration,
    /// Orders shown per page
    pub orders_page_size: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (production, staging, ...)
    pub sentry_environment: Option<String>,
    /// Fraction of errors reported to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Plant backend connection settings.
#[derive(Debug, Clone)]
pub struct PlantApiConfig {
    /// Base URL; endpoint paths are joined onto it
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Image cache settings.
#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    /// When false, image requests redirect straight to the signed URL
    pub enabled: bool,
    /// `SQLite` database path
    pub path: PathBuf,
    /// Entry time-to-live
    pub ttl: Duration,
    /// Maximum number of cached images
    pub max_entries: usize,
    /// Bodies larger than this are served but not stored
    pub max_bytes: usize,
    /// How often expired entries are swept
    pub sweep_interval: Duration,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("data/image-cache.db"),
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            max_entries: 100,
            max_bytes: 5 * 1024 * 1024,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = env.parse_or("STOREFRONT_HOST", "127.0.0.1")?;
        let port = env.parse_or("STOREFRONT_PORT", "3000")?;
        let base_url = env.required("STOREFRONT_BASE_URL")?;
        let static_dir = PathBuf::from(env.or_default("STOREFRONT_STATIC_DIR", "crates/storefront/static"));

        let api = PlantApiConfig {
            base_url: env.parse_or("PLANT_API_BASE_URL", DEFAULT_API_BASE_URL)?,
            timeout: Duration::from_millis(env.parse_or("PLANT_API_TIMEOUT_MS", "5000")?),
        };

        let image_cache = ImageCacheConfig {
            enabled: env.parse_bool_or("IMAGE_CACHE_ENABLED", true)?,
            path: PathBuf::from(env.or_default("IMAGE_CACHE_PATH", "data/image-cache.db")),
            ttl: Duration::from_secs(env.parse_or("IMAGE_CACHE_TTL_SECS", "604800")?),
            max_entries: env.parse_or("IMAGE_CACHE_MAX_ENTRIES", "100")?,
            max_bytes: env.parse_or("IMAGE_CACHE_MAX_BYTES", "5242880")?,
            sweep_interval: Duration::from_secs(env.parse_or("IMAGE_CACHE_SWEEP_SECS", "3600")?),
        };
        if image_cache.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "IMAGE_CACHE_SWEEP_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let cart_sync_debounce = Duration::from_millis(env.parse_or("CART_SYNC_DEBOUNCE_MS", "500")?);
        let orders_page_size: u32 = env.parse_or("ORDERS_PAGE_SIZE", "10")?;
        if orders_page_size == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ORDERS_PAGE_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            base_url,
            static_dir,
            api,
            image_cache,
            cart_sync_debounce,
            orders_page_size,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.parse_or("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: env.parse_or("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get an optional variable; blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable (or its default) into `T`.
    fn parse_or<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Parse a boolean flag, accepting the usual spellings.
    fn parse_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.optional(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("expected a boolean, got '{other}'"),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<StorefrontConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StorefrontConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("STOREFRONT_BASE_URL", "http://localhost:3000")]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.api.base_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.api.timeout, Duration::from_secs(5));
        assert!(config.image_cache.enabled);
        assert_eq!(config.image_cache.ttl, Duration::from_secs(604_800));
        assert_eq!(config.image_cache.max_entries, 100);
        assert_eq!(config.cart_sync_debounce, Duration::from_millis(500));
        assert_eq!(config.orders_page_size, 10);
        assert!(config.sentry_dsn.is_none());
        assert!((config.sentry_traces_sample_rate - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_base_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "STOREFRONT_BASE_URL"));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("STOREFRONT_PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "STOREFRONT_PORT"));
    }

    #[test]
    fn test_invalid_api_url() {
        let err = load(&[
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("PLANT_API_BASE_URL", "not a url"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "PLANT_API_BASE_URL"));
    }

    #[test]
    fn test_boolean_flag() {
        let config = load(&[
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("IMAGE_CACHE_ENABLED", "off"),
        ])
        .unwrap();
        assert!(!config.image_cache.enabled);

        let err = load(&[
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("IMAGE_CACHE_ENABLED", "maybe"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(..)));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let err = load(&[
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("ORDERS_PAGE_SIZE", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "ORDERS_PAGE_SIZE"));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let err = load(&[
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("IMAGE_CACHE_SWEEP_SECS", "0"),
        ])
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "IMAGE_CACHE_SWEEP_SECS")
        );
    }

    #[test]
    fn test_blank_optional_is_unset() {
        let config = load(&[
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("SENTRY_DSN", "  "),
        ])
        .unwrap();
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_socket_addr() {
        let config = load(&[
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("STOREFRONT_HOST", "0.0.0.0"),
            ("STOREFRONT_PORT", "8081"),
        ])
        .unwrap();

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
        assert_eq!(addr.port(), 8081);
    }
}
