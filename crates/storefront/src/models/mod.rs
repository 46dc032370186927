//! Domain models for the storefront.
//!
//! Everything here is plain data: the cart and its sync delta, the shipping
//! address, flash toasts, and the session-stored user.

pub mod address;
pub mod cart;
pub mod flash;
pub mod session;

pub use address::{AddressError, ShippingAddress};
pub use cart::{Cart, CartDelta, CartLine, DeltaLine, LineKey};
pub use flash::{Flash, FlashKind, push_flash, take_flashes};
pub use session::{CurrentUser, keys as session_keys};
