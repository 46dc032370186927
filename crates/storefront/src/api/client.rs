//! Plant backend client implementation.
//!
//! Uses `reqwest` 0.13 for HTTP. Caches the plant list and plant details
//! using `moka` (5-minute TTL).

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use myrmeco_core::PlantId;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::cache::{CacheKey, CacheValue};
use super::types::{
    CreatePaymentRequest, Envelope, FetchedImage, LoginBody, LoginRequest, MessageBody, OrderPage,
    PaymentIntent, PlantDetail, PlantSummary, RegisterRequest, SignedImageBody, StockLevel,
    StockQuery,
};
use super::{ApiError, GENERIC_FAILURE};
use crate::config::PlantApiConfig;
use crate::models::CartDelta;

/// How long catalog reads stay cached.
const CATALOG_TTL: Duration = Duration::from_secs(300);

/// Longest error body excerpt written to logs.
const LOG_BODY_CHARS: usize = 500;

// =============================================================================
// PlantApiClient
// =============================================================================

/// Client for the plant backend.
///
/// Cheap to clone. Catalog reads are cached for 5 minutes; everything
/// per-user goes straight to the backend.
#[derive(Clone)]
pub struct PlantApiClient {
    inner: Arc<PlantApiClientInner>,
}

struct PlantApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    cache: Cache<CacheKey, CacheValue>,
}

impl PlantApiClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &PlantApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("myrmeco-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(CATALOG_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(PlantApiClientInner {
                client,
                base_url: config.base_url.clone(),
                cache,
            }),
        })
    }

    /// Build a request against a backend path, attaching the bearer token.
    fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&SecretString>,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self.inner.base_url.join(path)?;
        let builder = self.inner.client.request(method, url);
        Ok(match token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        })
    }

    /// Send a request and decode the body as `T`.
    ///
    /// Non-2xx statuses are mapped to `ApiError` variants, carrying the
    /// backend's `{message}` when it sent one.
    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<MessageBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.trim().is_empty());

            return Err(match status {
                StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
                StatusCode::NOT_FOUND => {
                    ApiError::NotFound(message.unwrap_or_else(|| "resource".to_string()))
                }
                _ => {
                    tracing::warn!(
                        status = %status,
                        body = %excerpt(&body),
                        "Plant backend returned non-success status"
                    );
                    ApiError::Backend(message.unwrap_or_else(|| GENERIC_FAILURE.to_string()))
                }
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse plant backend response"
            );
            ApiError::Parse(e)
        })
    }

    /// Send a request whose body is a `{success, message, data}` envelope.
    async fn send_envelope<T: DeserializeOwned>(
        builder: RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        Self::send::<Envelope<T>>(builder).await?.into_result()
    }

    // =========================================================================
    // Auth Methods
    // =========================================================================

    /// Log in with a username, email, or phone number.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` or `ApiError::Backend` carrying the
    /// backend's message when the credentials are rejected.
    #[instrument(skip(self, password))]
    pub async fn login(&self, account: &str, password: &str) -> Result<LoginBody, ApiError> {
        let builder = self
            .request(Method::POST, "/api/login", None)?
            .json(&LoginRequest { account, password });
        Self::send(builder).await
    }

    /// Register a new account. Returns the backend's confirmation message.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Backend` when the backend refuses the registration.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: &RegisterRequest<'_>) -> Result<Option<String>, ApiError> {
        let builder = self.request(Method::POST, "/api/register", None)?.json(request);
        let body: MessageBody = Self::send(builder).await?;
        Ok(body.message)
    }

    /// Tell the backend the session is over.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; callers treat this as best effort.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: Option<&SecretString>) -> Result<(), ApiError> {
        self.request(Method::POST, "/api/logout", token)?
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    // =========================================================================
    // Catalog Methods
    // =========================================================================

    /// List all plants.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn list_plants(&self) -> Result<Arc<Vec<PlantSummary>>, ApiError> {
        if let Some(CacheValue::Plants(plants)) = self.inner.cache.get(&CacheKey::Plants).await {
            debug!("Cache hit for plant list");
            return Ok(plants);
        }

        let builder = self.request(Method::GET, "/api/plants", None)?;
        let plants = Arc::new(
            Self::send_envelope::<Vec<PlantSummary>>(builder)
                .await?
                .unwrap_or_default(),
        );

        self.inner
            .cache
            .insert(CacheKey::Plants, CacheValue::Plants(Arc::clone(&plants)))
            .await;

        Ok(plants)
    }

    /// Get one plant with its gallery and size variants.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the plant doesn't exist, or an error
    /// if the API request fails.
    #[instrument(skip(self), fields(plant_id = %id))]
    pub async fn plant_detail(&self, id: PlantId) -> Result<PlantDetail, ApiError> {
        let key = CacheKey::PlantDetail(id);

        if let Some(CacheValue::PlantDetail(detail)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for plant detail");
            return Ok(*detail);
        }

        let builder = self.request(Method::GET, &format!("/api/plant-detail/{id}"), None)?;
        let mut detail = Self::send_envelope::<PlantDetail>(builder)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("plant {id}")))?;
        detail.plant_id.get_or_insert(id);

        self.inner
            .cache
            .insert(key, CacheValue::PlantDetail(Box::new(detail.clone())))
            .await;

        Ok(detail)
    }

    /// Exchange a stored image URL for a short-lived signed one.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no URL.
    #[instrument(skip(self))]
    pub async fn sign_plant_image(&self, img_url: &str) -> Result<String, ApiError> {
        let builder = self
            .request(Method::GET, "/api/plant-image", None)?
            .query(&[("imgUrl", img_url)]);
        let body: SignedImageBody = Self::send(builder).await?;
        body.into_url()
            .ok_or_else(|| ApiError::Backend("image signing returned no URL".to_string()))
    }

    /// Download an image body from an absolute (signed) URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails or the body is not an image.
    #[instrument(skip(self, url))]
    pub async fn fetch_image(&self, url: &str) -> Result<FetchedImage, ApiError> {
        let response = self.inner.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::UnexpectedContent(content_type));
        }

        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedImage {
            content_type,
            bytes,
        })
    }

    // =========================================================================
    // Cart & Order Methods
    // =========================================================================

    /// Fetch current stock for the given cart lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, token, lines), fields(lines = lines.len()))]
    pub async fn sync_stock(
        &self,
        token: Option<&SecretString>,
        lines: &[StockQuery<'_>],
    ) -> Result<Vec<StockLevel>, ApiError> {
        let builder = self
            .request(Method::POST, "/api/cart/sync-stock", token)?
            .json(lines);
        Ok(Self::send_envelope(builder).await?.unwrap_or_default())
    }

    /// Push an incremental cart change.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, token, delta))]
    pub async fn sync_cart(
        &self,
        token: Option<&SecretString>,
        delta: &CartDelta,
    ) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, "/api/cart/sync-redis", token)?
            .json(delta);
        Self::send_envelope::<serde::de::IgnoredAny>(builder).await?;
        Ok(())
    }

    /// Create an order and payment for the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the order.
    #[instrument(skip(self, token, request), fields(lines = request.items.len()))]
    pub async fn create_payment(
        &self,
        token: Option<&SecretString>,
        request: &CreatePaymentRequest<'_>,
    ) -> Result<PaymentIntent, ApiError> {
        let builder = self
            .request(Method::POST, "/api/order/create-payment", token)?
            .json(request);
        Ok(Self::send_envelope(builder).await?.unwrap_or_default())
    }

    /// Fetch one page of the visitor's order history.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` if the token was rejected, or an
    /// error if the API request fails.
    #[instrument(skip(self, token))]
    pub async fn get_orders(
        &self,
        token: Option<&SecretString>,
        page: u32,
        page_size: u32,
    ) -> Result<OrderPage, ApiError> {
        let builder = self
            .request(Method::GET, "/api/order/get-orders", token)?
            .query(&[("page", page), ("pageSize", page_size)]);
        Ok(Self::send_envelope(builder).await?.unwrap_or_default())
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(LOG_BODY_CHARS).collect()
}
