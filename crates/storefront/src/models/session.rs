//! Session-related types.
//!
//! Types stored in the session for authentication state.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use myrmeco_core::UserId;

use crate::api::LoginBody;

/// Session-stored user identity.
///
/// Built from the login response and kept until logout or until the backend
/// rejects the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Backend user ID.
    pub id: UserId,
    /// Display name.
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Bearer token, when login issued one.
    #[serde(default, with = "secret_token")]
    pub token: Option<SecretString>,
}

impl CurrentUser {
    /// Build the session user from a successful login.
    #[must_use]
    pub fn from_login(body: &LoginBody) -> Self {
        Self {
            id: body.user.id,
            username: body.user.username.clone(),
            email: body.user.email.clone(),
            phone: body.user.phone.clone(),
            token: body.token().map(|t| SecretString::from(t.to_string())),
        }
    }
}

/// Serde bridge for the bearer token; `SecretString` is not serializable
/// on its own.
mod secret_token {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        token: &Option<SecretString>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        token
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SecretString>, D::Error> {
        Option::<String>::deserialize(deserializer).map(|t| t.map(SecretString::from))
    }
}

/// Session keys for visitor state.
pub mod keys {
    use myrmeco_core::UserId;

    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the anonymous visitor's cart.
    pub const GUEST_CART: &str = "cart:guest";

    /// Key for pending flash toasts.
    pub const FLASH: &str = "flash";

    /// Message shown inside the auth modal on its next render.
    pub const AUTH_ERROR: &str = "auth_error";

    /// Cart key for a user, or the guest cart.
    #[must_use]
    pub fn cart(user: Option<UserId>) -> String {
        user.map_or_else(|| GUEST_CART.to_string(), |id| format!("cart:{id}"))
    }

    /// Shipping address key for a user.
    #[must_use]
    pub fn address(user: UserId) -> String {
        format!("address:{user}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_token_survives_session_round_trip() {
        let body: LoginBody = serde_json::from_str(
            r#"{"message":"ok","user":{"id":3,"username":"mei","email":"m@x.cn","token":"t0k"}}"#,
        )
        .unwrap();
        let user = CurrentUser::from_login(&body);

        let stored = serde_json::to_string(&user).unwrap();
        let restored: CurrentUser = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored.id, UserId::new(3));
        assert_eq!(restored.token.unwrap().expose_secret(), "t0k");
    }

    #[test]
    fn test_debug_redacts_token() {
        let user = CurrentUser {
            id: UserId::new(1),
            username: "mei".to_string(),
            email: None,
            phone: None,
            token: Some(SecretString::from("very-secret-token".to_string())),
        };
        assert!(!format!("{user:?}").contains("very-secret-token"));
    }

    #[test]
    fn test_keys() {
        assert_eq!(keys::cart(None), "cart:guest");
        assert_eq!(keys::cart(Some(UserId::new(42))), "cart:42");
        assert_eq!(keys::address(UserId::new(42)), "address:42");
    }
}
