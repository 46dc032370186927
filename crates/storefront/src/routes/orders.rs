//! Order history route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use super::images::image_src;
use super::layout::Layout;
use crate::api::{ApiError, Order, OrderItem, OrderPage};
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireUser;
use crate::state::AppState;

/// Order line image edge in pixels.
const ITEM_IMAGE_SIZE: u32 = 80;

/// Query for `/orders`.
#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub page: Option<u32>,
}

/// Prev/next paging state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub max_page: u64,
}

impl Pagination {
    /// `max_page` is `ceil(total / page_size)`.
    #[must_use]
    pub fn new(page: u32, page_size: u32, total: u64) -> Self {
        Self {
            page: page.max(1),
            max_page: total.div_ceil(u64::from(page_size.max(1))),
        }
    }

    #[must_use]
    pub const fn has_prev(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.max_page
    }

    #[must_use]
    pub const fn prev(&self) -> u32 {
        self.page.saturating_sub(1)
    }

    #[must_use]
    pub const fn next(&self) -> u32 {
        self.page.saturating_add(1)
    }
}

/// Order line display data for templates.
pub struct OrderItemView {
    pub name: String,
    pub latin_name: String,
    pub sku: String,
    pub quantity: u32,
    pub price: String,
    pub image_src: String,
}

impl OrderItemView {
    fn new(item: &OrderItem, order: &Order) -> Self {
        Self {
            name: item.name().to_string(),
            latin_name: item.latin_name().to_string(),
            sku: item.sku().to_string(),
            quantity: item.quantity().get(),
            price: item.price.display(),
            image_src: image_src(item.image(order), Some(ITEM_IMAGE_SIZE)),
        }
    }
}

/// Order display data for templates.
pub struct OrderView {
    pub order_sn: String,
    pub status_label: &'static str,
    pub status_class: &'static str,
    pub created: String,
    pub pay_amount: String,
    pub total_amount: String,
    pub show_original: bool,
    pub items: Vec<OrderItemView>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_sn: order.display_sn().to_string(),
            status_label: order.order_status.label(),
            status_class: order.order_status.css_class(),
            created: order.display_time(),
            pay_amount: order.pay_amount.display(),
            total_amount: order.total_amount.display(),
            show_original: order.shows_original_amount(),
            items: order
                .order_items
                .iter()
                .map(|item| OrderItemView::new(item, order))
                .collect(),
        }
    }
}

/// Order history template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersTemplate {
    pub layout: Layout,
    pub orders: Vec<OrderView>,
    pub pagination: Pagination,
    /// The backend could not be reached.
    pub load_error: bool,
}

/// Display one page of the visitor's orders, newest first.
#[instrument(skip(state, user, layout), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<OrdersQuery>,
    layout: Layout,
) -> Result<Response> {
    let page_size = state.config().orders_page_size;
    let page = query.page.unwrap_or(1).max(1);

    let (mut orders, load_error) = match state
        .api()
        .get_orders(user.token.as_ref(), page, page_size)
        .await
    {
        Ok(orders) => (orders, false),
        Err(e @ ApiError::Unauthorized(_)) => return Err(e.into()),
        Err(e) => {
            tracing::error!("Failed to fetch orders: {e}");
            (OrderPage::default(), true)
        }
    };
    orders.sort_newest_first();

    Ok(OrdersTemplate {
        layout,
        orders: orders.list.iter().map(OrderView::from).collect(),
        pagination: Pagination::new(page, page_size, orders.total),
        load_error,
    }
    .into_response())
}
