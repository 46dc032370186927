//! Cart route handlers.
//!
//! The cart lives in the session (see `services::visitor`). Mutations are
//! plain form posts that redirect back; logged-in carts are synced to the
//! backend in the background.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use myrmeco_core::{PlantId, Quantity};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::images::image_src;
use super::layout::{Layout, cart_return_path};
use crate::api::{ApiError, CreatePaymentRequest, PaymentLine, StockQuery};
use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{OptionalUser, RequireUser};
use crate::models::{Cart, CartLine, Flash, LineKey, ShippingAddress, push_flash};
use crate::services::visitor;
use crate::state::AppState;

/// Cart line image edge in pixels.
const LINE_IMAGE_SIZE: u32 = 120;

// =============================================================================
// Views
// =============================================================================

/// Cart line display data for templates.
#[derive(Clone)]
pub struct CartLineView {
    pub plant_id: PlantId,
    pub size: String,
    pub name: String,
    pub latin_name: String,
    pub image_src: String,
    pub unit_price: String,
    pub line_total: String,
    pub quantity: u32,
    pub max_quantity: Option<u32>,
    pub sold_out: bool,
    pub at_stock_limit: bool,
    pub can_decrease: bool,
}

impl From<&CartLine> for CartLineView {
    fn from(line: &CartLine) -> Self {
        Self {
            plant_id: line.plant_id,
            size: line.size.clone(),
            name: line.name.clone(),
            latin_name: line.latin_name.clone(),
            image_src: image_src(&line.image_url, Some(LINE_IMAGE_SIZE)),
            unit_price: line.unit_price.display(),
            line_total: line.line_total().display(),
            quantity: line.quantity.get(),
            max_quantity: line.stock.filter(|s| *s > 0),
            sold_out: line.is_sold_out(),
            at_stock_limit: line.at_stock_limit(),
            can_decrease: line.quantity > Quantity::ONE,
        }
    }
}

/// Cart display data for templates.
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub total: String,
    pub item_count: u64,
    pub has_sold_out: bool,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            lines: cart.lines().iter().map(CartLineView::from).collect(),
            total: cart.total().display(),
            item_count: cart.item_count(),
            has_sold_out: cart.has_sold_out(),
        }
    }
}

// =============================================================================
// Forms
// =============================================================================

/// Add to cart form data.
///
/// Only the plant, size, and quantity come from the form; names and prices
/// are read from the backend.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub plant_id: PlantId,
    #[serde(default)]
    pub size: String,
    pub quantity: Option<i64>,
}

/// Quantity control on a cart line.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityAction {
    Increase,
    Decrease,
    Set,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub plant_id: PlantId,
    pub size: String,
    pub action: Option<QuantityAction>,
    pub quantity: Option<i64>,
    /// Page the quick cart was opened on.
    pub next: Option<String>,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub plant_id: PlantId,
    pub size: String,
    pub next: Option<String>,
}

/// Clear cart form data.
#[derive(Debug, Deserialize)]
pub struct ClearCartForm {
    pub next: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub layout: Layout,
    pub cart: CartView,
    pub address: Option<String>,
}

/// Cart count badge fragment template.
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u64,
}

/// Shipping address form template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/address.html")]
pub struct AddressTemplate {
    pub layout: Layout,
    pub address: ShippingAddress,
    pub error: Option<String>,
}

// =============================================================================
// Cart Routes
// =============================================================================

/// Display the cart page.
///
/// Refreshes stock levels from the backend first; a failed refresh keeps the
/// last known levels.
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    layout: Layout,
) -> Result<Response> {
    let user_id = user.as_ref().map(|u| u.id);
    let mut cart = visitor::load_cart(&session, user_id).await;

    if !cart.is_empty() {
        let queries: Vec<StockQuery<'_>> = cart
            .lines()
            .iter()
            .map(|l| StockQuery {
                id: l.plant_id,
                size: &l.size,
            })
            .collect();
        let token = user.as_ref().and_then(|u| u.token.as_ref());

        match state.api().sync_stock(token, &queries).await {
            Ok(levels) => {
                let levels: Vec<(LineKey, u32)> = levels
                    .into_iter()
                    .map(|l| {
                        let stock = u32::try_from(l.stock.max(0)).unwrap_or(u32::MAX);
                        (LineKey::new(l.id, l.size), stock)
                    })
                    .collect();
                (cart, ()) = visitor::update_cart(
                    &session,
                    state.cart_sync(),
                    user.as_ref(),
                    |cart| cart.apply_stock(levels),
                )
                .await?;
            }
            Err(e @ ApiError::Unauthorized(_)) => return Err(e.into()),
            Err(e) => tracing::warn!("Stock refresh failed: {e}"),
        }
    }

    let address = match user_id {
        Some(id) => visitor::load_address(&session, id)
            .await
            .map(|a| a.summary()),
        None => None,
    };

    Ok(CartShowTemplate {
        layout,
        cart: CartView::from(&cart),
        address,
    }
    .into_response())
}

/// Add a plant to the cart.
#[instrument(skip(state, session, user))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let back = format!("/plants/{}", form.plant_id);

    let detail = match state.api().plant_detail(form.plant_id).await {
        Ok(detail) => detail,
        Err(ApiError::NotFound(_)) => {
            push_flash(&session, Flash::error("That plant could not be found")).await;
            return Ok(Redirect::to("/").into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let Some(sku) = detail.sku(form.size.trim()) else {
        push_flash(&session, Flash::error("Please choose a size")).await;
        return Ok(Redirect::to(&back).into_response());
    };
    if sku.is_sold_out() {
        push_flash(&session, Flash::error("This size is sold out")).await;
        return Ok(Redirect::to(&back).into_response());
    }

    let image_url = if detail.main_img_url.is_empty() {
        detail
            .gallery()
            .first()
            .map(|u| (*u).to_string())
            .unwrap_or_default()
    } else {
        detail.main_img_url.clone()
    };

    let line = CartLine {
        plant_id: form.plant_id,
        size: sku.size.clone(),
        name: detail.name.clone(),
        latin_name: detail.latin_name.clone(),
        unit_price: sku.price,
        image_url,
        quantity: Quantity::from_i64(form.quantity.unwrap_or(1)),
        stock: sku.stock_level(),
    };

    visitor::update_cart(&session, state.cart_sync(), user.as_ref(), |cart| {
        cart.add(line);
    })
    .await?;

    let plant_id = form.plant_id.to_string();
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("plant_id", &plant_id), ("size", &sku.size)]),
    );
    push_flash(
        &session,
        Flash::success(format!("Added {} ({}) to your cart", detail.name, sku.size)),
    )
    .await;

    Ok(Redirect::to(&format!("{back}?sku={}", urlencode(&sku.size))).into_response())
}

/// Change a line's quantity.
#[instrument(skip(state, session, user))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Form(form): Form<UpdateCartForm>,
) -> Result<Redirect> {
    let action = form.action.unwrap_or(QuantityAction::Set);
    let (_, found) = visitor::update_cart(&session, state.cart_sync(), user.as_ref(), |cart| {
        match action {
            QuantityAction::Increase => cart.increase(form.plant_id, &form.size),
            QuantityAction::Decrease => cart.decrease(form.plant_id, &form.size),
            QuantityAction::Set => {
                cart.update_quantity(form.plant_id, &form.size, form.quantity.unwrap_or(1))
            }
        }
    })
    .await?;

    if !found {
        push_flash(&session, Flash::error("That item is no longer in your cart")).await;
    }
    Ok(Redirect::to(&cart_return_path(form.next.as_deref())))
}

/// Remove a line.
#[instrument(skip(state, session, user))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Redirect> {
    let (_, removed) = visitor::update_cart(&session, state.cart_sync(), user.as_ref(), |cart| {
        cart.remove(form.plant_id, &form.size)
    })
    .await?;

    if removed {
        push_flash(&session, Flash::info("Item removed from your cart")).await;
    }
    Ok(Redirect::to(&cart_return_path(form.next.as_deref())))
}

/// Empty the cart.
#[instrument(skip_all)]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Form(form): Form<ClearCartForm>,
) -> Result<Redirect> {
    visitor::update_cart(&session, state.cart_sync(), user.as_ref(), Cart::clear).await?;
    push_flash(&session, Flash::info("Your cart is now empty")).await;
    Ok(Redirect::to(&cart_return_path(form.next.as_deref())))
}

/// Cart count badge fragment.
#[instrument(skip_all)]
pub async fn count(session: Session, OptionalUser(user): OptionalUser) -> impl IntoResponse {
    let cart = visitor::load_cart(&session, user.map(|u| u.id)).await;
    CartCountTemplate {
        count: cart.item_count(),
    }
}

// =============================================================================
// Checkout
// =============================================================================

/// Create an order and payment for the cart.
///
/// On success the cart is emptied and the visitor is sent to the payment
/// page, or to their orders when the backend gave no payment URL.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    RequireUser(user): RequireUser,
) -> Result<Response> {
    let cart = visitor::load_cart(&session, Some(user.id)).await;

    if cart.is_empty() {
        push_flash(&session, Flash::error("Your cart is empty")).await;
        return Ok(Redirect::to("/cart").into_response());
    }
    if cart.has_sold_out() {
        push_flash(
            &session,
            Flash::error("Some items are sold out, please remove them before checking out"),
        )
        .await;
        return Ok(Redirect::to("/cart").into_response());
    }
    let Some(address) = visitor::load_address(&session, user.id).await else {
        push_flash(&session, Flash::info("Please add a shipping address first")).await;
        return Ok(Redirect::to("/cart/address").into_response());
    };

    let request = CreatePaymentRequest {
        items: cart
            .lines()
            .iter()
            .map(|l| PaymentLine {
                id: l.plant_id,
                size: &l.size,
                quantity: l.quantity,
            })
            .collect(),
        address: &address,
    };

    let intent = match state.api().create_payment(user.token.as_ref(), &request).await {
        Ok(intent) => intent,
        Err(e @ ApiError::Unauthorized(_)) => return Err(e.into()),
        Err(e) => {
            tracing::warn!("Checkout failed: {e}");
            let message = e
                .backend_message()
                .unwrap_or("Checkout failed, please try again")
                .to_string();
            push_flash(&session, Flash::error(message)).await;
            return Ok(Redirect::to("/cart").into_response());
        }
    };

    visitor::update_cart(&session, state.cart_sync(), Some(&user), Cart::clear).await?;

    let message = intent.order_sn.as_deref().map_or_else(
        || "Order created".to_string(),
        |sn| format!("Order {sn} created"),
    );
    push_flash(&session, Flash::success(message)).await;
    tracing::info!(order_sn = ?intent.order_sn, "Order created");

    let target = intent
        .pay_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or("/orders");
    Ok(Redirect::to(target).into_response())
}

// =============================================================================
// Shipping Address
// =============================================================================

/// Display the shipping address form.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn address_form(
    session: Session,
    RequireUser(user): RequireUser,
    layout: Layout,
) -> impl IntoResponse {
    let address = visitor::load_address(&session, user.id)
        .await
        .unwrap_or_default();
    AddressTemplate {
        layout,
        address,
        error: None,
    }
}

/// Validate and save the shipping address.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn save_address(
    session: Session,
    RequireUser(user): RequireUser,
    layout: Layout,
    Form(address): Form<ShippingAddress>,
) -> Result<Response> {
    let address = address.normalized();

    if let Err(e) = address.validate() {
        return Ok(AddressTemplate {
            layout,
            address,
            error: Some(e.to_string()),
        }
        .into_response());
    }

    visitor::save_address(&session, user.id, &address).await?;
    push_flash(&session, Flash::success("Shipping address saved")).await;
    Ok(Redirect::to("/cart").into_response())
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
