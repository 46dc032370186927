//! Plant backend REST client.
//!
//! # Architecture
//!
//! - One `reqwest` client shared by every handler via `AppState`
//! - The backend is the source of truth for prices, stock, and orders
//! - Catalog reads (plant list, plant detail) are cached in `moka` (5 minute TTL)
//! - Per-user calls carry the visitor's bearer token when login issued one
//!
//! # Wire format
//!
//! Most endpoints wrap their payload in `{success, message, data}`. Login
//! answers `{message, user}` and failures carry `{message}` with a non-2xx
//! status.
//!
//! # Example
//!
//! ```rust,ignore
//! use myrmeco_storefront::api::PlantApiClient;
//!
//! let client = PlantApiClient::new(&config.api)?;
//! let plants = client.list_plants().await?;
//! let detail = client.plant_detail(plants[0].plant_id).await?;
//! ```

mod cache;
mod client;
pub mod types;

pub use client::PlantApiClient;
pub use types::*;

use thiserror::Error;

/// Fallback shown when the backend fails without saying why.
pub const GENERIC_FAILURE: &str = "The plant service is unavailable, please try again later";

/// Errors that can occur when talking to the plant backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the JSON we expected.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Backend answered `success: false` or a non-2xx status.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Session token missing, expired, or rejected.
    #[error("Unauthorized: {}", .0.as_deref().unwrap_or("token rejected"))]
    Unauthorized(Option<String>),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Fetched resource was not what we asked for (e.g. an HTML error page
    /// instead of an image).
    #[error("Unexpected content type: {0}")]
    UnexpectedContent(String),
}

impl ApiError {
    /// Message the backend attached to a failure, if any.
    ///
    /// Safe to show to the visitor: these are the backend's own user-facing
    /// strings ("wrong password", "username taken").
    #[must_use]
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Backend(msg) => Some(msg.as_str()),
            Self::Unauthorized(msg) => msg.as_deref(),
            _ => None,
        }
    }

    /// Whether this error means the visitor's session is no longer valid.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("plant 7".to_string());
        assert_eq!(err.to_string(), "Not found: plant 7");

        let err = ApiError::Unauthorized(None);
        assert_eq!(err.to_string(), "Unauthorized: token rejected");
    }

    #[test]
    fn test_backend_message() {
        let err = ApiError::Backend("Username already taken".to_string());
        assert_eq!(err.backend_message(), Some("Username already taken"));

        let err = ApiError::Unauthorized(Some("Wrong password".to_string()));
        assert_eq!(err.backend_message(), Some("Wrong password"));
        assert!(err.is_unauthorized());

        let err = ApiError::RateLimited(3);
        assert_eq!(err.backend_message(), None);
    }

    #[test]
    fn test_rate_limited_error() {
        let err = ApiError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }
}
