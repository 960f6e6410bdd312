//! Kasuwa storefront: carts, checkout, and payment settlement.
//!
//! The purchase pipeline runs Cart -> Checkout -> Payment: the cart is a
//! per-user scratch pad with no inventory claim, checkout converts it into
//! an immutable order inside one transaction, and payment confirmation is
//! the single point where a deferred order's stock is actually committed.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod state;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use state::Store;
