//! Plant detail route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use myrmeco_core::PlantId;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::images::image_src;
use super::layout::Layout;
use crate::api::{ApiError, PlantDetail, PlantSku};
use crate::error::Result;
use crate::filters;
use crate::models::{Flash, push_flash};
use crate::state::AppState;

/// Main image edge in pixels.
const MAIN_IMAGE_SIZE: u32 = 800;

/// Gallery thumbnail edge in pixels.
const THUMB_IMAGE_SIZE: u32 = 80;

/// Query for the detail page: selected size and gallery image.
#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    pub sku: Option<String>,
    pub image: Option<usize>,
}

/// One size option.
#[derive(Clone)]
pub struct SkuView {
    pub size: String,
    pub price: String,
    pub selected: bool,
    pub sold_out: bool,
}

/// One gallery thumbnail.
#[derive(Clone)]
pub struct ThumbView {
    pub index: usize,
    pub src: String,
    pub active: bool,
}

/// Plant detail display data for templates.
pub struct PlantView {
    pub id: PlantId,
    pub name: String,
    pub latin_name: String,
    pub main_image_src: String,
    pub thumbs: Vec<ThumbView>,
    pub skus: Vec<SkuView>,
    /// Size preselected in the add-to-cart form.
    pub selected_size: Option<String>,
    pub price: String,
    pub stock_label: Option<String>,
    /// Upper bound for the quantity input.
    pub max_quantity: Option<u32>,
    pub sold_out: bool,
}

impl PlantView {
    fn new(id: PlantId, detail: &PlantDetail, query: &DetailQuery) -> Self {
        let selected: Option<&PlantSku> = query
            .sku
            .as_deref()
            .and_then(|size| detail.sku(size))
            .or_else(|| detail.default_sku());

        let gallery = detail.gallery();
        let active = query
            .image
            .filter(|i| *i < gallery.len())
            .unwrap_or_default();

        let main_image_src = gallery
            .get(active)
            .map_or_else(|| image_src("", None), |url| image_src(url, Some(MAIN_IMAGE_SIZE)));

        let thumbs = gallery
            .iter()
            .enumerate()
            .map(|(index, url)| ThumbView {
                index,
                src: image_src(url, Some(THUMB_IMAGE_SIZE)),
                active: index == active,
            })
            .collect();

        let skus = detail
            .skus
            .iter()
            .map(|sku| SkuView {
                size: sku.size.clone(),
                price: sku.price.display(),
                selected: selected.is_some_and(|s| s.size == sku.size),
                sold_out: sku.is_sold_out(),
            })
            .collect();

        let price = selected
            .map(|s| s.price)
            .or(detail.min_price)
            .map_or_else(String::new, |p| p.display());

        let stock = selected.and_then(PlantSku::stock_level);

        Self {
            id,
            name: detail.name.clone(),
            latin_name: detail.latin_name.clone(),
            main_image_src,
            thumbs,
            skus,
            selected_size: selected.map(|s| s.size.clone()),
            price,
            stock_label: stock.map(|s| match s {
                0 => "Sold out".to_string(),
                n => format!("{n} in stock"),
            }),
            max_quantity: stock.filter(|s| *s > 0),
            sold_out: selected.is_none_or(PlantSku::is_sold_out),
        }
    }
}

/// Plant detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "plants/show.html")]
pub struct PlantShowTemplate {
    pub layout: Layout,
    pub plant: PlantView,
}

/// Display a plant.
///
/// Unknown or malformed ids send the visitor home with a toast.
#[instrument(skip(state, session, layout, query))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Query(query): Query<DetailQuery>,
    layout: Layout,
) -> Result<Response> {
    let Ok(id) = id.parse::<PlantId>() else {
        return Ok(not_found(&session).await);
    };

    match state.api().plant_detail(id).await {
        Ok(detail) => Ok(PlantShowTemplate {
            layout,
            plant: PlantView::new(id, &detail, &query),
        }
        .into_response()),
        Err(ApiError::NotFound(_)) => Ok(not_found(&session).await),
        Err(e) => Err(e.into()),
    }
}

async fn not_found(session: &Session) -> Response {
    push_flash(session, Flash::error("That plant could not be found")).await;
    Redirect::to("/").into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn detail() -> PlantDetail {
        serde_json::from_str(
            r#"{
                "plant_id": 5,
                "name": "Ant plant",
                "latin_name": "Squamellaria imberbis",
                "main_img_url": "https://oss.example/main.jpg",
                "min_price": "58.00",
                "images": [
                    {"img_url": "https://oss.example/1.jpg"},
                    {"img_url": "https://oss.example/2.jpg"}
                ],
                "skus": [
                    {"size": "S", "price": "58.00", "stock": 0},
                    {"size": "M", "price": "88.50", "stock": 4}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_to_first_sku_and_image() {
        let view = PlantView::new(PlantId::new(5), &detail(), &DetailQuery::default());
        assert_eq!(view.selected_size.as_deref(), Some("S"));
        assert!(view.sold_out);
        assert_eq!(view.stock_label.as_deref(), Some("Sold out"));
        assert_eq!(view.max_quantity, None);
        assert!(view.thumbs[0].active);
        assert!(!view.thumbs[1].active);
    }

    #[test]
    fn test_selected_sku_and_image() {
        let query = DetailQuery {
            sku: Some("M".to_string()),
            image: Some(1),
        };
        let view = PlantView::new(PlantId::new(5), &detail(), &query);
        assert_eq!(view.price, "¥88.50");
        assert_eq!(view.max_quantity, Some(4));
        assert!(!view.sold_out);
        assert!(view.skus[1].selected);
        assert!(view.thumbs[1].active);
        assert!(view.main_image_src.contains("2.jpg"));
    }

    #[test]
    fn test_out_of_range_image_falls_back_to_first() {
        let query = DetailQuery {
            sku: Some("XL".to_string()),
            image: Some(9),
        };
        let view = PlantView::new(PlantId::new(5), &detail(), &query);
        assert_eq!(view.selected_size.as_deref(), Some("S"));
        assert!(view.thumbs[0].active);
    }
}
