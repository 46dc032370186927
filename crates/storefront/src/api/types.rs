//! Wire types for the plant backend.
//!
//! Field names follow the backend's JSON. Anything the backend is known to
//! leave out or send as `null` is defaulted rather than failing the whole
//! response.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use myrmeco_core::{OrderStatus, PlantId, Price, Quantity, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use super::{ApiError, GENERIC_FAILURE};
use crate::models::ShippingAddress;

// =============================================================================
// Envelope
// =============================================================================

/// Standard `{success, message, data}` response wrapper.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, turning `success: false` into an error.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Backend` with the backend's message when the
    /// envelope reports failure.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Backend(
                self.message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
            ))
        }
    }
}

/// Bare `{message}` body used by register, logout, and error responses.
#[derive(Debug, Default, Deserialize)]
pub struct MessageBody {
    pub message: Option<String>,
}

// =============================================================================
// Catalog
// =============================================================================

/// A plant as listed on the home grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantSummary {
    pub plant_id: PlantId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub latin_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub main_img_url: String,
    pub min_price: Option<Price>,
}

impl PlantSummary {
    /// Price label for the card, e.g. `¥88.00`.
    #[must_use]
    pub fn price_label(&self) -> String {
        self.min_price.map_or_else(String::new, |p| p.display())
    }
}

/// Full plant detail with gallery and size variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantDetail {
    pub plant_id: Option<PlantId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub latin_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub main_img_url: String,
    pub min_price: Option<Price>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<PlantImage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skus: Vec<PlantSku>,
}

/// One gallery image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantImage {
    pub img_url: String,
}

/// A purchasable size of a plant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantSku {
    pub size: String,
    pub price: Price,
    pub stock: Option<i64>,
}

impl PlantSku {
    /// Stock clamped into `u32`; negative stock reads as sold out.
    #[must_use]
    pub fn stock_level(&self) -> Option<u32> {
        self.stock
            .map(|s| u32::try_from(s.max(0)).unwrap_or(u32::MAX))
    }

    /// Known to be out of stock.
    #[must_use]
    pub fn is_sold_out(&self) -> bool {
        self.stock_level() == Some(0)
    }
}

impl PlantDetail {
    /// Look up a size variant by name.
    #[must_use]
    pub fn sku(&self, size: &str) -> Option<&PlantSku> {
        self.skus.iter().find(|s| s.size == size)
    }

    /// The variant selected when the page first renders.
    #[must_use]
    pub fn default_sku(&self) -> Option<&PlantSku> {
        self.skus.first()
    }

    /// Gallery image URLs, falling back to the main image.
    #[must_use]
    pub fn gallery(&self) -> Vec<&str> {
        let urls: Vec<&str> = self
            .images
            .iter()
            .map(|i| i.img_url.as_str())
            .filter(|u| !u.is_empty())
            .collect();
        if urls.is_empty() && !self.main_img_url.is_empty() {
            vec![self.main_img_url.as_str()]
        } else {
            urls
        }
    }
}

/// `/api/plant-image` response. The signed URL has been seen both at the top
/// level and inside `data`.
#[derive(Debug, Default, Deserialize)]
pub struct SignedImageBody {
    pub url: Option<String>,
    pub data: Option<serde_json::Value>,
}

impl SignedImageBody {
    /// Extract the signed URL from wherever the backend put it.
    #[must_use]
    pub fn into_url(self) -> Option<String> {
        let nested = match self.data {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Object(mut map)) => match map.remove("url") {
                Some(serde_json::Value::String(s)) => Some(s),
                _ => None,
            },
            _ => None,
        };
        self.url.or(nested).filter(|u| !u.trim().is_empty())
    }
}

/// An image body downloaded from a signed URL.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    /// Username, email, or phone.
    pub account: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
}

/// `/api/login` success body.
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub message: Option<String>,
    pub user: ApiUser,
    pub token: Option<String>,
}

/// User as returned by login.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    pub id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub token: Option<String>,
}

impl LoginBody {
    /// The bearer token, wherever the backend put it.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.user
            .token
            .as_deref()
            .or(self.token.as_deref())
            .filter(|t| !t.is_empty())
    }
}

// =============================================================================
// Cart
// =============================================================================

/// Line key sent to the stock endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StockQuery<'a> {
    pub id: PlantId,
    pub size: &'a str,
}

/// Current stock for one line.
#[derive(Debug, Clone, Deserialize)]
pub struct StockLevel {
    pub id: PlantId,
    pub size: String,
    pub stock: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest<'a> {
    pub items: Vec<PaymentLine<'a>>,
    pub address: &'a ShippingAddress,
}

#[derive(Debug, Serialize)]
pub struct PaymentLine<'a> {
    pub id: PlantId,
    pub size: &'a str,
    pub quantity: Quantity,
}

/// Result of creating a payment.
#[derive(Debug, Default, Deserialize)]
pub struct PaymentIntent {
    #[serde(alias = "orderSn")]
    pub order_sn: Option<String>,
    #[serde(alias = "payUrl")]
    pub pay_url: Option<String>,
}

// =============================================================================
// Orders
// =============================================================================

/// One page of order history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub list: Vec<Order>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
}

impl OrderPage {
    /// Sort orders newest first. Orders without a parseable time go last.
    pub fn sort_newest_first(&mut self) {
        self.list
            .sort_by_key(|o| std::cmp::Reverse(o.created_at()));
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    #[serde(default, deserialize_with = "null_as_default")]
    pub order_sn: String,
    #[serde(default = "unknown_status", deserialize_with = "status_or_unknown")]
    pub order_status: OrderStatus,
    pub create_time: Option<String>,
    #[serde(default)]
    pub pay_amount: Amount,
    #[serde(default)]
    pub total_amount: Amount,
    #[serde(default, deserialize_with = "null_as_default")]
    pub order_items: Vec<OrderItem>,
    pub main_img_url: Option<String>,
}

impl Order {
    /// Parsed creation time.
    #[must_use]
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        self.create_time.as_deref().and_then(parse_backend_time)
    }

    /// Creation time as `YYYY/MM/DD HH:MM`.
    ///
    /// Unparseable times are shown as sent.
    #[must_use]
    pub fn display_time(&self) -> String {
        match self.create_time.as_deref().map(str::trim) {
            None | Some("") => "Unknown time".to_string(),
            Some(raw) => parse_backend_time(raw)
                .map_or_else(|| raw.to_string(), |t| t.format("%Y/%m/%d %H:%M").to_string()),
        }
    }

    /// Order number, or a placeholder.
    #[must_use]
    pub fn display_sn(&self) -> &str {
        if self.order_sn.is_empty() {
            "Unknown"
        } else {
            &self.order_sn
        }
    }

    /// Whether the pre-discount total should be shown struck through.
    #[must_use]
    pub fn shows_original_amount(&self) -> bool {
        self.total_amount != self.pay_amount
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItem {
    pub plant_name: Option<String>,
    pub plant_latin_name: Option<String>,
    pub sku_size: Option<String>,
    #[serde(default)]
    pub price: Amount,
    pub quantity: Option<i64>,
    pub main_img_url: Option<String>,
}

impl OrderItem {
    #[must_use]
    pub fn name(&self) -> &str {
        non_empty(self.plant_name.as_deref()).unwrap_or("Unknown plant")
    }

    #[must_use]
    pub fn latin_name(&self) -> &str {
        non_empty(self.plant_latin_name.as_deref()).unwrap_or("No Latin name")
    }

    #[must_use]
    pub fn sku(&self) -> &str {
        non_empty(self.sku_size.as_deref()).unwrap_or("No size")
    }

    #[must_use]
    pub fn quantity(&self) -> Quantity {
        self.quantity.map_or(Quantity::ONE, Quantity::from_i64)
    }

    /// Image for the line, falling back to the order's main image.
    #[must_use]
    pub fn image<'a>(&'a self, order: &'a Order) -> &'a str {
        non_empty(self.main_img_url.as_deref())
            .or_else(|| non_empty(order.main_img_url.as_deref()))
            .unwrap_or("")
    }
}

/// A money amount the backend may send as a number, a string, or garbage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Amount(Option<Decimal>);

impl Amount {
    /// Parsed value, if it was numeric.
    #[must_use]
    pub const fn value(&self) -> Option<Decimal> {
        self.0
    }

    /// `¥x.xx`; anything non-numeric renders as `¥0.00`.
    #[must_use]
    pub fn display(&self) -> String {
        Price::new(self.0.unwrap_or_default()).display()
    }

    fn from_json(value: &serde_json::Value) -> Self {
        let parsed = match value {
            serde_json::Value::Number(n) => {
                let s = n.to_string();
                Decimal::from_str(&s)
                    .or_else(|_| Decimal::from_scientific(&s))
                    .ok()
            }
            serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        Self(parsed)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(|v| Self::from_json(&v))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

const fn unknown_status() -> OrderStatus {
    OrderStatus::Unknown(-1)
}

/// Status code sent as a number or a numeric string; anything else is unknown.
fn status_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OrderStatus, D::Error> {
    let code = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(code.map_or_else(unknown_status, OrderStatus::from_code))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// Parse the handful of timestamp shapes the backend emits.
fn parse_backend_time(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
