//! Unified error handling for the cart-to-order pipeline.
//!
//! All service operations return `Result<T, StoreError>`. The taxonomy
//! distinguishes user-correctable failures (validation, stock) from
//! boundary violations (auth, replay) and storage failures, so callers can
//! render a precise message without parsing strings.

use thiserror::Error;

use kasuwa_core::{MoneyError, OrderId, ProductId};

use crate::db::RepositoryError;

/// One product that failed checkout re-validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockViolation {
    pub product_id: ProductId,
    pub name: String,
    pub requested: u32,
    /// Units currently available (0 when the product went inactive).
    pub available: i64,
}

/// Pipeline-level error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad or missing input, one message per offending field.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A single cart mutation asked for more than is available.
    /// `available` is the maximum quantity the operation would accept.
    #[error("insufficient stock for {name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        requested: u32,
        available: i64,
    },

    /// Checkout re-validation failed; names every offending product.
    #[error("stock conflict on {} product(s)", .0.len())]
    StockConflict(Vec<StockViolation>),

    /// Checkout attempted with an empty cart. Callers should redirect to
    /// the cart page rather than surface an error.
    #[error("cart is empty")]
    EmptyCart,

    /// Resource not found or not owned by the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// No authenticated identity in the session.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but the CSRF token did not match.
    #[error("forbidden: csrf token mismatch")]
    Forbidden,

    /// Confirmation callback with a stale or mismatched merchant reference.
    /// Callers treat this as a no-op; it is logged server-side.
    #[error("payment replay for order {order_id}")]
    PaymentReplay { order_id: OrderId },

    /// Monetary arithmetic failed (corrupt price data or overflow).
    #[error("money error: {0}")]
    Money(#[from] MoneyError),

    /// Storage-layer failure; the transaction was rolled back.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl StoreError {
    /// A message safe to show the user. Storage and arithmetic internals
    /// are collapsed into a generic retry prompt.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(messages) => messages.join(" "),
            Self::InsufficientStock {
                name, available, ..
            } => {
                format!("Not enough stock for {name}. Maximum available: {available}.")
            }
            Self::StockConflict(violations) => {
                let names: Vec<&str> = violations.iter().map(|v| v.name.as_str()).collect();
                format!(
                    "Sorry, these items are no longer available in the requested quantity: {}.",
                    names.join(", ")
                )
            }
            Self::EmptyCart => "Your cart is empty.".to_owned(),
            Self::NotFound(what) => format!("{what} not found."),
            Self::Unauthorized => "Please log in to continue.".to_owned(),
            Self::Forbidden => "Invalid request. Please try again.".to_owned(),
            Self::PaymentReplay { .. } | Self::Money(_) | Self::Repository(_) => {
                "Something went wrong. Please try again.".to_owned()
            }
        }
    }

    /// Whether the caller may safely retry the same operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Repository(_))
    }
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message_names_product() {
        let err = StoreError::InsufficientStock {
            product_id: ProductId::new(1),
            name: "Ankara Tote".to_owned(),
            requested: 5,
            available: 2,
        };
        let msg = err.user_message();
        assert!(msg.contains("Ankara Tote"));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_stock_conflict_names_every_product() {
        let err = StoreError::StockConflict(vec![
            StockViolation {
                product_id: ProductId::new(1),
                name: "Shea Butter".to_owned(),
                requested: 3,
                available: 1,
            },
            StockViolation {
                product_id: ProductId::new(2),
                name: "Adire Scarf".to_owned(),
                requested: 1,
                available: 0,
            },
        ]);
        let msg = err.user_message();
        assert!(msg.contains("Shea Butter"));
        assert!(msg.contains("Adire Scarf"));
    }

    #[test]
    fn test_storage_errors_do_not_leak_internals() {
        let err = StoreError::Repository(RepositoryError::DataCorruption(
            "price column has garbage".to_owned(),
        ));
        assert!(!err.user_message().contains("price column"));
        assert!(err.is_retryable());
    }
}
