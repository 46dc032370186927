//! Storefront services.
//!
//! - `cart_sync` - debounced push of cart deltas to the backend
//! - `visitor` - cart and shipping address held in the session

pub mod cart_sync;
pub mod visitor;

pub use cart_sync::{CartSink, CartSyncer};
