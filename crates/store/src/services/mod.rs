//! Service layer: the typed operations the web layer calls.
//!
//! Each service borrows the shared pool and configuration from
//! [`crate::state::Store`] and enforces the session boundary before any
//! entity is touched.

pub mod cart;
pub mod checkout;
pub mod payment;

pub use cart::{CartMutation, CartService};
pub use checkout::{CheckoutOutcome, CheckoutService};
pub use payment::{GatewayRedirect, PaymentConfirmation, PaymentOutcome, PaymentService};
