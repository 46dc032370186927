//! Myrmeco Core - Shared domain types.
//!
//! Types shared by the storefront binary and its integration tests:
//! identifiers, money, quantities, order statuses, and validated contact
//! fields.
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no
//! session handling. Everything here can be unit tested without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, quantities, emails, phones, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
