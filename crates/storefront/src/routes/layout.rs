//! Data every full page needs: header, toasts, the auth modal, and the
//! quick cart drawer.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use super::cart::CartView;
use crate::models::{CurrentUser, Flash, session_keys, take_flashes};
use crate::services::visitor;

/// Which form the auth modal shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

impl AuthMode {
    /// Parse the `?auth=` query value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "login" => Some(Self::Login),
            "register" => Some(Self::Register),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
        }
    }
}

/// Query parameter and value that open the quick cart drawer.
const QUICK_CART_PARAM: &str = "cart";
const QUICK_CART_OPEN: &str = "open";

/// The auth modal, when open.
#[derive(Debug, Clone)]
pub struct AuthModal {
    pub mode: AuthMode,
    pub error: Option<String>,
}

impl AuthModal {
    #[must_use]
    pub fn is_register(&self) -> bool {
        self.mode == AuthMode::Register
    }
}

/// Shared page chrome.
///
/// Extracting it consumes pending flash messages, so only handlers that
/// render a page should take it.
pub struct Layout {
    pub user: Option<CurrentUser>,
    pub cart_count: u64,
    pub flashes: Vec<Flash>,
    pub auth: Option<AuthModal>,
    /// Cart contents for the drawer, when `?cart=open` is set.
    pub quick_cart: Option<CartView>,
    /// Path of the current page, used as the post-login destination.
    pub path: String,
}

impl Layout {
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }
}

impl<S> FromRequestParts<S> for Layout
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();
        let query = parts.uri.query();
        let mode = query.and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "auth")
                .and_then(|(_, value)| AuthMode::parse(&value))
        });
        let quick_cart_open = quick_cart_requested(&path, query);

        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(Self {
                user: None,
                cart_count: 0,
                flashes: Vec::new(),
                auth: mode.map(|mode| AuthModal { mode, error: None }),
                quick_cart: None,
                path,
            });
        };

        let user = session
            .get::<CurrentUser>(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten();
        let cart = visitor::load_cart(session, user.as_ref().map(|u| u.id)).await;
        let cart_count = cart.item_count();
        let quick_cart = quick_cart_open.then(|| CartView::from(&cart));
        let flashes = take_flashes(session).await;

        let auth = match mode {
            Some(mode) if user.is_none() => {
                let error = session
                    .remove::<String>(session_keys::AUTH_ERROR)
                    .await
                    .ok()
                    .flatten();
                Some(AuthModal { mode, error })
            }
            _ => None,
        };

        Ok(Self {
            user,
            cart_count,
            flashes,
            auth,
            quick_cart,
            path,
        })
    }
}

/// Whether the drawer was asked for. The cart page never shows it.
#[must_use]
pub fn quick_cart_requested(path: &str, query: Option<&str>) -> bool {
    path != "/cart"
        && query.is_some_and(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .any(|(key, value)| key == QUICK_CART_PARAM && value == QUICK_CART_OPEN)
        })
}

/// Where a cart mutation goes next: back to the drawer on the page it was
/// posted from, or to the cart page.
#[must_use]
pub fn cart_return_path(next: Option<&str>) -> String {
    match next.map(|n| safe_return_path(Some(n))) {
        Some(path) if path != "/cart" => {
            format!("{path}?{QUICK_CART_PARAM}={QUICK_CART_OPEN}")
        }
        _ => "/cart".to_string(),
    }
}

/// Only same-site absolute paths are accepted as redirect targets.
#[must_use]
pub fn safe_return_path(next: Option<&str>) -> &str {
    let path = next
        .map(str::trim)
        .and_then(|n| n.split(['?', '#']).next())
        .unwrap_or_default();
    if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') {
        path
    } else {
        "/"
    }
}

/// `path` with the auth modal opened in `mode`.
#[must_use]
pub fn with_auth_modal(path: &str, mode: AuthMode) -> String {
    format!("{}?auth={}", safe_return_path(Some(path)), mode.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_mode_parse() {
        assert_eq!(AuthMode::parse("login"), Some(AuthMode::Login));
        assert_eq!(AuthMode::parse("register"), Some(AuthMode::Register));
        assert_eq!(AuthMode::parse("admin"), None);
    }

    #[test]
    fn test_safe_return_path() {
        assert_eq!(safe_return_path(Some("/plants/3")), "/plants/3");
        assert_eq!(safe_return_path(Some("/cart?auth=login")), "/cart");
        assert_eq!(safe_return_path(Some("//evil.example")), "/");
        assert_eq!(safe_return_path(Some("https://evil.example")), "/");
        assert_eq!(safe_return_path(Some("/\\evil")), "/");
        assert_eq!(safe_return_path(None), "/");
    }

    #[test]
    fn test_with_auth_modal() {
        assert_eq!(with_auth_modal("/orders", AuthMode::Login), "/orders?auth=login");
        assert_eq!(with_auth_modal("", AuthMode::Register), "/?auth=register");
    }

    #[test]
    fn test_quick_cart_requested() {
        assert!(quick_cart_requested("/", Some("cart=open")));
        assert!(quick_cart_requested("/plants/2", Some("sku=M&cart=open")));
        assert!(!quick_cart_requested("/", Some("cart=closed")));
        assert!(!quick_cart_requested("/", Some("auth=login")));
        assert!(!quick_cart_requested("/", None));
        assert!(!quick_cart_requested("/cart", Some("cart=open")));
    }

    #[test]
    fn test_cart_return_path() {
        assert_eq!(cart_return_path(None), "/cart");
        assert_eq!(cart_return_path(Some("/cart")), "/cart");
        assert_eq!(cart_return_path(Some("/plants/2")), "/plants/2?cart=open");
        assert_eq!(cart_return_path(Some("/?cart=open")), "/?cart=open");
        assert_eq!(cart_return_path(Some("//evil.example")), "/?cart=open");
    }
}
