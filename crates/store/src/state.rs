//! Shared application state.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::StoreConfig;
use crate::db::{CartRepository, OrderRepository, ProductRepository};
use crate::services::{CartService, CheckoutService, PaymentService};

/// Shared state handle. Cheap to clone; all clones point at the same pool
/// and configuration.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    pool: SqlitePool,
}

impl Store {
    /// Assemble the store from its loaded configuration and an open pool.
    #[must_use]
    pub fn new(config: StoreConfig, pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(StoreInner { config, pool }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    /// Cart Store operations.
    #[must_use]
    pub fn cart(&self) -> CartService<'_> {
        CartService::new(&self.inner.pool, &self.inner.config)
    }

    /// Order Materializer operations.
    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_> {
        CheckoutService::new(&self.inner.pool, &self.inner.config)
    }

    /// Payment Handoff operations.
    #[must_use]
    pub fn payments(&self) -> PaymentService<'_> {
        PaymentService::new(&self.inner.pool, &self.inner.config)
    }

    /// Catalog and inventory reads.
    #[must_use]
    pub fn products(&self) -> ProductRepository<'_> {
        ProductRepository::new(&self.inner.pool, self.inner.config.currency)
    }

    /// Cart persistence reads outside the service layer.
    #[must_use]
    pub fn cart_repo(&self) -> CartRepository<'_> {
        CartRepository::new(&self.inner.pool, self.inner.config.currency)
    }

    /// Order reads outside the service layer.
    #[must_use]
    pub fn orders(&self) -> OrderRepository<'_> {
        OrderRepository::new(&self.inner.pool, self.inner.config.currency)
    }
}
