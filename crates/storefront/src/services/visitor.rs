//! Per-visitor state kept in the session: cart and shipping address.
//!
//! Carts are stored under `cart:<user id>` for logged-in visitors and under
//! `cart:guest` otherwise. Every mutation goes through [`update_cart`], which
//! saves the new cart and hands the difference to the [`CartSyncer`].

use myrmeco_core::UserId;
use tower_sessions::Session;
use tracing::warn;

use super::cart_sync::CartSyncer;
use crate::models::{Cart, CartDelta, CurrentUser, ShippingAddress, session_keys};

/// Session write error.
pub type SessionError = tower_sessions::session::Error;

/// Load the visitor's cart. A missing or unreadable cart is empty.
pub async fn load_cart(session: &Session, user: Option<UserId>) -> Cart {
    match session.get::<Cart>(&session_keys::cart(user)).await {
        Ok(cart) => cart.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Failed to read cart from session");
            Cart::default()
        }
    }
}

/// Store the visitor's cart.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn save_cart(
    session: &Session,
    user: Option<UserId>,
    cart: &Cart,
) -> Result<(), SessionError> {
    session.insert(&session_keys::cart(user), cart).await
}

/// Apply `f` to the visitor's cart, save it, and queue the delta for sync.
///
/// Guests are never synced.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn update_cart<R>(
    session: &Session,
    syncer: &CartSyncer,
    user: Option<&CurrentUser>,
    f: impl FnOnce(&mut Cart) -> R,
) -> Result<(Cart, R), SessionError> {
    let user_id = user.map(|u| u.id);
    let previous = load_cart(session, user_id).await;
    let mut cart = previous.clone();
    let result = f(&mut cart);

    if cart != previous {
        save_cart(session, user_id, &cart).await?;
        if let Some(user) = user {
            syncer.push(user, CartDelta::between(&previous, &cart));
        }
    }

    Ok((cart, result))
}

/// Fold the guest cart into a freshly logged-in user's cart.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn merge_guest_cart(
    session: &Session,
    syncer: &CartSyncer,
    user: &CurrentUser,
) -> Result<(), SessionError> {
    let guest = load_cart(session, None).await;
    if guest.is_empty() {
        return Ok(());
    }

    update_cart(session, syncer, Some(user), |cart| cart.merge_from(guest)).await?;
    session.remove_value(session_keys::GUEST_CART).await?;
    Ok(())
}

/// The user's saved shipping address, if any.
pub async fn load_address(session: &Session, user: UserId) -> Option<ShippingAddress> {
    session
        .get::<ShippingAddress>(&session_keys::address(user))
        .await
        .ok()
        .flatten()
}

/// Save the user's shipping address.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn save_address(
    session: &Session,
    user: UserId,
    address: &ShippingAddress,
) -> Result<(), SessionError> {
    session.insert(&session_keys::address(user), address).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;

    use myrmeco_core::{PlantId, Price, Quantity};
    use secrecy::SecretString;
    use tokio::sync::mpsc;
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::api::ApiError;
    use crate::models::CartLine;
    use crate::services::cart_sync::CartSink;

    struct ChannelSink(mpsc::UnboundedSender<CartDelta>);

    impl CartSink for ChannelSink {
        fn push(
            &self,
            _user: UserId,
            _token: Option<SecretString>,
            delta: CartDelta,
        ) -> impl Future<Output = Result<(), ApiError>> + Send {
            let _ = self.0.send(delta);
            async { Ok(()) }
        }
    }

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    fn syncer() -> (CartSyncer, mpsc::UnboundedReceiver<CartDelta>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CartSyncer::spawn(ChannelSink(tx), Duration::from_millis(10)), rx)
    }

    fn user() -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            username: "mei".to_string(),
            email: None,
            phone: None,
            token: None,
        }
    }

    fn line(id: i64, quantity: u32) -> CartLine {
        CartLine {
            plant_id: PlantId::new(id),
            size: "M".to_string(),
            name: format!("Plant {id}"),
            latin_name: String::new(),
            unit_price: Price::from_fen(1_000),
            image_url: String::new(),
            quantity: Quantity::new(quantity),
            stock: None,
        }
    }

    #[tokio::test]
    async fn test_guest_cart_is_saved_but_not_synced() {
        let session = session();
        let (syncer, mut rx) = syncer();

        let (cart, ()) = update_cart(&session, &syncer, None, |c| c.add(line(1, 2)))
            .await
            .unwrap();
        assert_eq!(cart.item_count(), 2);
        assert_eq!(load_cart(&session, None).await, cart);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_user_cart_change_is_synced() {
        let session = session();
        let (syncer, mut rx) = syncer();
        let user = user();

        update_cart(&session, &syncer, Some(&user), |c| c.add(line(1, 1)))
            .await
            .unwrap();

        let delta = rx.recv().await.unwrap();
        assert_eq!(delta.added_or_updated.len(), 1);
        assert_eq!(delta.added_or_updated[0].id, PlantId::new(1));
        assert!(load_cart(&session, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_merge_guest_cart_on_login() {
        let session = session();
        let (syncer, mut rx) = syncer();
        let user = user();

        update_cart(&session, &syncer, Some(&user), |c| c.add(line(1, 1)))
            .await
            .unwrap();
        let _ = rx.recv().await;

        update_cart(&session, &syncer, None, |c| {
            c.add(line(1, 2));
            c.add(line(2, 1));
        })
        .await
        .unwrap();

        merge_guest_cart(&session, &syncer, &user).await.unwrap();

        let cart = load_cart(&session, Some(user.id)).await;
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.item_count(), 4);
        assert!(load_cart(&session, None).await.is_empty());

        let delta = rx.recv().await.unwrap();
        assert_eq!(delta.added_or_updated.len(), 2);
    }

    #[tokio::test]
    async fn test_address_round_trip() {
        let session = session();
        let id = UserId::new(7);
        assert!(load_address(&session, id).await.is_none());

        let address = ShippingAddress {
            receiver: "Li Wei".to_string(),
            phone: "13812345678".to_string(),
            province: "Yunnan".to_string(),
            city: "Kunming".to_string(),
            area: "Wuhua".to_string(),
            detail_address: "12 Green Lane".to_string(),
        };
        save_address(&session, id, &address).await.unwrap();
        assert_eq!(load_address(&session, id).await, Some(address));
    }
}
