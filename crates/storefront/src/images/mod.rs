//! Plant image cache.
//!
//! Plant photos live behind short-lived signed URLs. Rather than re-signing
//! and re-downloading on every page view, [`ImageService`] keeps the bodies
//! in an [`ImageStore`] keyed by the original URL plus the resize transform:
//!
//! 1. cache hit: serve the stored body
//! 2. miss: sign via the backend, fetch, store, trim to the LRU cap
//! 3. anything fails: serve a built-in SVG placeholder
//!
//! With caching disabled the service skips the store and redirects the
//! browser to the signed URL.

mod store;

pub use store::{CachedImage, ImageStore, ImageStoreError, NoopImageStore, SqliteImageStore};

use std::sync::Arc;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::api::{ApiError, FetchedImage, PlantApiClient};
use crate::config::ImageCacheConfig;

/// Largest edge a resize request may ask for.
const MAX_EDGE: u32 = 2000;

/// Shown whenever an image can't be produced.
pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 200" width="200" height="200"><rect width="200" height="200" fill="#eef2ec"/><path d="M100 150c0-40 10-70 40-90-5 35-20 60-40 90zm0 0c0-30-8-52-32-68 4 28 16 48 32 68z" fill="#9fb89a"/><path d="M100 150v20" stroke="#7d9878" stroke-width="4" stroke-linecap="round"/></svg>"##;

/// Result of resolving an image request.
#[derive(Debug)]
pub enum ResolvedImage {
    /// Image body, from the cache or freshly fetched.
    Body { content_type: String, data: Vec<u8> },
    /// Caching disabled: send the browser to the signed URL.
    Redirect(String),
    /// Something failed along the way.
    Placeholder,
}

impl IntoResponse for ResolvedImage {
    fn into_response(self) -> Response {
        match self {
            Self::Body { content_type, data } => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                data,
            )
                .into_response(),
            Self::Redirect(url) => Redirect::temporary(&url).into_response(),
            Self::Placeholder => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "image/svg+xml"),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                PLACEHOLDER_SVG,
            )
                .into_response(),
        }
    }
}

/// Cache key: the original URL plus the transform parameter.
///
/// This is also the string handed to the signing endpoint, so the signed
/// URL carries the transform.
#[must_use]
pub fn cache_key(url: &str, transform: Option<&str>) -> String {
    match transform {
        Some(t) if !t.is_empty() => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}{t}")
        }
        _ => url.to_string(),
    }
}

/// Build the resize transform for the requested box.
#[must_use]
pub fn resize_transform(width: Option<u32>, height: Option<u32>) -> Option<String> {
    let clamp = |v: u32| v.clamp(1, MAX_EDGE);
    match (width.map(clamp), height.map(clamp)) {
        (None, None) => None,
        (w, h) => {
            let mut t = String::from("image_process=resize");
            if let Some(h) = h {
                t.push_str(&format!(",h_{h}"));
            }
            if let Some(w) = w {
                t.push_str(&format!(",w_{w}"));
            }
            Some(t)
        }
    }
}

/// Check-cache / fetch / placeholder image resolver.
#[derive(Clone)]
pub struct ImageService {
    inner: Arc<ImageServiceInner>,
}

struct ImageServiceInner {
    api: PlantApiClient,
    store: Arc<dyn ImageStore>,
    config: ImageCacheConfig,
}

impl ImageService {
    #[must_use]
    pub fn new(api: PlantApiClient, store: Arc<dyn ImageStore>, config: ImageCacheConfig) -> Self {
        Self {
            inner: Arc::new(ImageServiceInner { api, store, config }),
        }
    }

    /// Open the configured store, falling back to no caching if the `SQLite`
    /// file can't be opened.
    #[must_use]
    pub fn from_config(api: PlantApiClient, config: &ImageCacheConfig) -> Self {
        let store: Arc<dyn ImageStore> = if config.enabled {
            match SqliteImageStore::open(&config.path, config.ttl) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(error = %e, path = %config.path.display(), "Image cache unavailable, serving uncached");
                    Arc::new(NoopImageStore)
                }
            }
        } else {
            Arc::new(NoopImageStore)
        };
        Self::new(api, store, config.clone())
    }

    /// Resolve an image: cache, else fetch, else placeholder.
    #[instrument(skip(self))]
    pub async fn resolve(&self, url: &str, transform: Option<&str>) -> ResolvedImage {
        let url = url.trim();
        if url.is_empty() {
            return ResolvedImage::Placeholder;
        }
        let key = cache_key(url, transform);

        if !self.inner.config.enabled {
            return match self.inner.api.sign_plant_image(&key).await {
                Ok(signed) => ResolvedImage::Redirect(signed),
                Err(e) => {
                    warn!(error = %e, "Image signing failed");
                    ResolvedImage::Placeholder
                }
            };
        }

        if let Some(hit) = self.lookup(&key).await {
            debug!("Image cache hit");
            return ResolvedImage::Body {
                content_type: hit.content_type,
                data: hit.data,
            };
        }

        match self.fetch_and_store(&key).await {
            Ok(image) => ResolvedImage::Body {
                content_type: image.content_type,
                data: image.bytes,
            },
            Err(e) => {
                warn!(error = %e, "Image fetch failed, serving placeholder");
                ResolvedImage::Placeholder
            }
        }
    }

    /// Store lookup. Store errors count as a miss.
    async fn lookup(&self, key: &str) -> Option<CachedImage> {
        let store = Arc::clone(&self.inner.store);
        let key = key.to_string();
        let result = tokio::task::spawn_blocking(move || store.get(&key, Utc::now()))
            .await
            .map_err(ImageStoreError::from)
            .and_then(|r| r);

        match result {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Image cache read failed");
                None
            }
        }
    }

    async fn fetch_and_store(&self, key: &str) -> Result<FetchedImage, ApiError> {
        let signed = self.inner.api.sign_plant_image(key).await?;
        let image = self.inner.api.fetch_image(&signed).await?;

        if image.bytes.len() > self.inner.config.max_bytes {
            debug!(bytes = image.bytes.len(), "Image too large to cache");
        } else {
            self.store(key, &image).await;
        }
        Ok(image)
    }

    /// Write an image and enforce the LRU cap. Failures are logged only.
    async fn store(&self, key: &str, image: &FetchedImage) {
        let store = Arc::clone(&self.inner.store);
        let key = key.to_string();
        let content_type = image.content_type.clone();
        let data = image.bytes.clone();
        let max_entries = self.inner.config.max_entries;

        let result = tokio::task::spawn_blocking(move || {
            store.put(&key, &content_type, &data, Utc::now())?;
            store.clean_lru(max_entries)
        })
        .await
        .map_err(ImageStoreError::from)
        .and_then(|r| r);

        match result {
            Ok(0) => {}
            Ok(evicted) => debug!(evicted, "Evicted least recently used images"),
            Err(e) => warn!(error = %e, "Image cache write failed"),
        }
    }

    /// Delete expired entries now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn sweep(&self) -> Result<usize, ImageStoreError> {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || store.clean_expired(Utc::now())).await?
    }

    /// Periodically sweep expired entries in the background.
    #[must_use]
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let service = self.clone();
        let period = service.inner.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                match service.sweep().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "Swept expired images"),
                    Err(e) => warn!(error = %e, "Image cache sweep failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("https://oss/a.jpg", None), "https://oss/a.jpg");
        assert_eq!(cache_key("https://oss/a.jpg", Some("")), "https://oss/a.jpg");
        assert_eq!(
            cache_key("https://oss/a.jpg", Some("image_process=resize,h_80,w_80")),
            "https://oss/a.jpg?image_process=resize,h_80,w_80"
        );
        assert_eq!(
            cache_key("https://oss/a.jpg?v=2", Some("image_process=resize,h_80")),
            "https://oss/a.jpg?v=2&image_process=resize,h_80"
        );
    }

    #[test]
    fn test_resize_transform() {
        assert_eq!(resize_transform(None, None), None);
        assert_eq!(
            resize_transform(Some(80), Some(80)).as_deref(),
            Some("image_process=resize,h_80,w_80")
        );
        assert_eq!(
            resize_transform(Some(0), None).as_deref(),
            Some("image_process=resize,w_1")
        );
        assert_eq!(
            resize_transform(None, Some(99_999)).as_deref(),
            Some("image_process=resize,h_2000")
        );
    }

    #[tokio::test]
    async fn test_placeholder_response() {
        let response = ResolvedImage::Placeholder.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(b"image/svg+xml".as_slice())
        );
    }
}
