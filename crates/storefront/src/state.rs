//! Application state shared across handlers.

use std::sync::Arc;

use crate::api::{ApiError, PlantApiClient};
use crate::config::StorefrontConfig;
use crate::images::ImageService;
use crate::services::CartSyncer;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// backend client, the image cache, and the cart syncer.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    api: PlantApiClient,
    images: ImageService,
    cart_sync: CartSyncer,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Spawns the cart sync task, so this must run inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, ApiError> {
        let api = PlantApiClient::new(&config.api)?;
        let images = ImageService::from_config(api.clone(), &config.image_cache);
        let cart_sync = CartSyncer::spawn(api.clone(), config.cart_sync_debounce);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                images,
                cart_sync,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the plant backend client.
    #[must_use]
    pub fn api(&self) -> &PlantApiClient {
        &self.inner.api
    }

    /// Get a reference to the plant image cache.
    #[must_use]
    pub fn images(&self) -> &ImageService {
        &self.inner.images
    }

    /// Get a reference to the cart syncer.
    #[must_use]
    pub fn cart_sync(&self) -> &CartSyncer {
        &self.inner.cart_sync
    }
}
