//! Cart Store operations.
//!
//! Every mutation re-validates against current stock, but the quantities
//! accepted here are advisory only: stock may drop between a cart mutation
//! and checkout, so the Order Materializer re-checks everything inside its
//! own transaction.

use sqlx::SqlitePool;
use tracing::instrument;

use kasuwa_core::{CartLineId, Money, ProductId};

use crate::config::StoreConfig;
use crate::db::{cart, products, CartRepository, RepositoryError};
use crate::error::{Result, StoreError};
use crate::models::CartLine;
use crate::session::SessionContext;

/// The cart state returned after a successful mutation, for badge and
/// toast rendering.
#[derive(Debug, Clone)]
pub struct CartMutation {
    /// Total units now in the cart.
    pub cart_count: u32,
    /// The affected line's new quantity (0 after a removal).
    pub quantity: u32,
    /// Display name of the affected product.
    pub product_name: String,
}

/// Cart Store service.
pub struct CartService<'a> {
    pool: &'a SqlitePool,
    config: &'a StoreConfig,
}

impl<'a> CartService<'a> {
    pub(crate) const fn new(pool: &'a SqlitePool, config: &'a StoreConfig) -> Self {
        Self { pool, config }
    }

    fn repo(&self) -> CartRepository<'a> {
        CartRepository::new(self.pool, self.config.currency)
    }

    /// Add `quantity` units of a product to the cart. A repeated add merges
    /// into the existing line; the merged total must fit within current
    /// stock or the whole operation is rejected.
    ///
    /// Validation and the write run inside one transaction, so the merge
    /// decision cannot act on a line another request replaced mid-flight.
    ///
    /// # Errors
    ///
    /// `Unauthorized`/`Forbidden` from the session boundary, `Validation`
    /// for a zero quantity, `NotFound` if the product is missing or
    /// inactive, `InsufficientStock` carrying the maximum addable amount.
    #[instrument(skip(self, ctx, csrf))]
    pub async fn add(
        &self,
        ctx: &SessionContext,
        csrf: &str,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartMutation> {
        let identity = ctx.authorize(csrf)?;

        if quantity == 0 {
            return Err(StoreError::Validation(vec![
                "Quantity must be at least 1.".to_owned(),
            ]));
        }

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let product = products::get_active_in_tx(&mut tx, product_id, self.config.currency)
            .await?
            .ok_or_else(|| StoreError::NotFound("Product".to_owned()))?;

        let new_quantity =
            match cart::find_by_product_in_tx(&mut tx, identity.user_id, product_id).await? {
                Some((line_id, existing)) => {
                    let merged = existing.saturating_add(quantity);
                    if i64::from(merged) > product.stock_quantity {
                        // Do not partially apply; tell the caller how much more fits.
                        let max_addable = product.stock_quantity - i64::from(existing);
                        return Err(StoreError::InsufficientStock {
                            product_id,
                            name: product.name,
                            requested: quantity,
                            available: max_addable.max(0),
                        });
                    }
                    cart::update_quantity_in_tx(&mut tx, identity.user_id, line_id, merged)
                        .await?;
                    merged
                }
                None => {
                    if i64::from(quantity) > product.stock_quantity {
                        return Err(StoreError::InsufficientStock {
                            product_id,
                            name: product.name,
                            requested: quantity,
                            available: product.stock_quantity,
                        });
                    }
                    cart::insert_in_tx(&mut tx, identity.user_id, product_id, quantity).await?;
                    quantity
                }
            };

        let cart_count = cart::count_in_tx(&mut tx, identity.user_id).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        Ok(CartMutation {
            cart_count,
            quantity: new_quantity,
            product_name: product.name,
        })
    }

    /// Set a cart line's quantity. Zero is equivalent to removal.
    ///
    /// Quantities above current stock are rejected with
    /// `InsufficientStock` and the line is left unchanged; clamping is a
    /// UI-edge concern, not done here.
    ///
    /// # Errors
    ///
    /// `Unauthorized`/`Forbidden`, `NotFound` for a missing line,
    /// `InsufficientStock` carrying the current stock.
    #[instrument(skip(self, ctx, csrf))]
    pub async fn set_quantity(
        &self,
        ctx: &SessionContext,
        csrf: &str,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartMutation> {
        let identity = ctx.authorize(csrf)?;
        let repo = self.repo();

        let Some(line) = repo.get(identity.user_id, line_id).await? else {
            return Err(StoreError::NotFound("Cart item".to_owned()));
        };

        if quantity == 0 {
            repo.delete(identity.user_id, line_id).await?;
            return Ok(CartMutation {
                cart_count: repo.count(identity.user_id).await?,
                quantity: 0,
                product_name: line.product_name,
            });
        }

        if i64::from(quantity) > line.available_stock {
            return Err(StoreError::InsufficientStock {
                product_id: line.product_id,
                name: line.product_name,
                requested: quantity,
                available: line.available_stock,
            });
        }

        repo.update_quantity(identity.user_id, line_id, quantity)
            .await?;

        Ok(CartMutation {
            cart_count: repo.count(identity.user_id).await?,
            quantity,
            product_name: line.product_name,
        })
    }

    /// Remove a cart line. Removing a non-existent line is a no-op success.
    ///
    /// # Errors
    ///
    /// `Unauthorized`/`Forbidden` from the session boundary.
    #[instrument(skip(self, ctx, csrf))]
    pub async fn remove(
        &self,
        ctx: &SessionContext,
        csrf: &str,
        line_id: CartLineId,
    ) -> Result<()> {
        let identity = ctx.authorize(csrf)?;
        self.repo().delete(identity.user_id, line_id).await?;
        Ok(())
    }

    /// Empty the cart. Idempotent.
    ///
    /// # Errors
    ///
    /// `Unauthorized`/`Forbidden` from the session boundary.
    #[instrument(skip(self, ctx, csrf))]
    pub async fn clear(&self, ctx: &SessionContext, csrf: &str) -> Result<()> {
        let identity = ctx.authorize(csrf)?;
        self.repo().clear(identity.user_id).await?;
        Ok(())
    }

    /// The cart contents, most recently added first, denormalized for
    /// display. Not the state checkout trusts.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if no user is logged in.
    #[instrument(skip(self, ctx))]
    pub async fn snapshot(&self, ctx: &SessionContext) -> Result<Vec<CartLine>> {
        let identity = ctx.identity()?;
        Ok(self.repo().snapshot(identity.user_id).await?)
    }

    /// Total units in the cart (the badge count).
    ///
    /// # Errors
    ///
    /// `Unauthorized` if no user is logged in.
    #[instrument(skip(self, ctx))]
    pub async fn count(&self, ctx: &SessionContext) -> Result<u32> {
        let identity = ctx.identity()?;
        Ok(self.repo().count(identity.user_id).await?)
    }

    /// Cart total at current prices.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if no user is logged in.
    #[instrument(skip(self, ctx))]
    pub async fn total(&self, ctx: &SessionContext) -> Result<Money> {
        let identity = ctx.identity()?;
        let mut total = Money::zero(self.config.currency);
        for line in self.repo().snapshot(identity.user_id).await? {
            total = total.checked_add(line.line_total()?)?;
        }
        Ok(total)
    }
}
