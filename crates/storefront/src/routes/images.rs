//! Cached plant image route.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use crate::images::resize_transform;
use crate::state::AppState;

/// Query for `/images/plant`.
#[derive(Debug, Deserialize)]
pub struct PlantImageQuery {
    #[serde(default)]
    pub url: String,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

/// Serve a plant image through the cache.
#[instrument(skip(state))]
pub async fn plant(
    State(state): State<AppState>,
    Query(query): Query<PlantImageQuery>,
) -> impl IntoResponse {
    let transform = resize_transform(query.w, query.h);
    state.images().resolve(&query.url, transform.as_deref()).await
}

/// Link to a plant image served through `/images/plant`, sized to fit a
/// `size` x `size` box.
#[must_use]
pub fn image_src(url: &str, size: Option<u32>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("url", url);
    if let Some(size) = size {
        let size = size.to_string();
        query.append_pair("w", &size);
        query.append_pair("h", &size);
    }
    format!("/images/plant?{}", query.finish())
}
