//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use myrmeco_core::PlantId;
use tracing::instrument;

use super::images::image_src;
use super::layout::Layout;
use crate::api::PlantSummary;
use crate::filters;
use crate::state::AppState;

/// Card image edge in pixels.
const CARD_IMAGE_SIZE: u32 = 400;

/// Plant card display data for templates.
#[derive(Clone)]
pub struct PlantCardView {
    pub id: PlantId,
    pub name: String,
    pub latin_name: String,
    pub image_src: String,
    pub price: String,
}

impl From<&PlantSummary> for PlantCardView {
    fn from(plant: &PlantSummary) -> Self {
        Self {
            id: plant.plant_id,
            name: plant.name.clone(),
            latin_name: plant.latin_name.clone(),
            image_src: image_src(&plant.main_img_url, Some(CARD_IMAGE_SIZE)),
            price: plant.price_label(),
        }
    }
}

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub layout: Layout,
    pub plants: Vec<PlantCardView>,
    /// The catalog could not be loaded.
    pub load_error: bool,
}

/// Display the home page.
#[instrument(skip_all)]
pub async fn home(State(state): State<AppState>, layout: Layout) -> impl IntoResponse {
    let (plants, load_error) = match state.api().list_plants().await {
        Ok(plants) => (plants.iter().map(PlantCardView::from).collect(), false),
        Err(e) => {
            tracing::error!("Failed to fetch plants: {e}");
            (Vec::new(), true)
        }
    };

    HomeTemplate {
        layout,
        plants,
        load_error,
    }
}
