//! Epsilon-gated product cost refresh

use super::guard::PropagationContext;
use crate::calculator::compute_product_cost;
use crate::core::{is_significant_change, ProductId, StoreError};
use crate::dispatch::locks::{EntityKey, EntityLocks};
use crate::events::ProductCostChanged;
use crate::store::CostStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostOutcome {
    /// New cost persisted
    Changed(ProductCostChanged),
    /// Recomputed cost within epsilon of the stored one; nothing written
    Unchanged(Decimal),
    /// No active recipe; the stored unit_cost stands as entered
    Authoritative(Decimal),
    /// Product does not exist in the chain's tenant
    Missing,
}

/// Outcome of one refresh plus what the cascade needs to know next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refreshed {
    pub product: ProductId,
    pub is_ingredient: bool,
    pub outcome: CostOutcome,
}

impl Refreshed {
    pub fn change(&self) -> Option<ProductCostChanged> {
        match self.outcome {
            CostOutcome::Changed(change) => Some(change),
            _ => None,
        }
    }
}

/// Recomputes a product's cost and persists it when it moved
pub struct CostRefresher {
    store: Arc<dyn CostStore>,
    locks: Arc<EntityLocks>,
    epsilon: Decimal,
}

impl CostRefresher {
    pub fn new(store: Arc<dyn CostStore>, locks: Arc<EntityLocks>, epsilon: Decimal) -> Self {
        Self {
            store,
            locks,
            epsilon,
        }
    }

    pub fn epsilon(&self) -> Decimal {
        self.epsilon
    }

    /// Read, recompute and conditionally save `product` under its entity lock
    pub fn refresh(
        &self,
        ctx: &PropagationContext,
        product: ProductId,
    ) -> Result<Refreshed, StoreError> {
        let tenant = ctx.tenant();
        let store = self.store.as_ref();

        self.locks.with_lock(EntityKey::Product(tenant, product), || -> Result<Refreshed, StoreError> {
            let Some(current) = store.product(tenant, product)? else {
                warn!(%tenant, %product, chain = ctx.chain_id(), "Product not found, nothing to refresh");
                return Ok(Refreshed {
                    product,
                    is_ingredient: false,
                    outcome: CostOutcome::Missing,
                });
            };

            let computed = compute_product_cost(store, tenant, product)?;
            let outcome = if !computed.has_recipe {
                CostOutcome::Authoritative(current.unit_cost)
            } else if is_significant_change(current.unit_cost, computed.cost, self.epsilon) {
                store.save_product_cost(tenant, product, computed.cost)?;
                debug!(
                    %tenant,
                    %product,
                    chain = ctx.chain_id(),
                    old = %current.unit_cost,
                    new = %computed.cost,
                    "Product cost updated"
                );
                CostOutcome::Changed(ProductCostChanged {
                    tenant_id: tenant,
                    product_id: product,
                    old_cost: current.unit_cost,
                    new_cost: computed.cost,
                })
            } else {
                CostOutcome::Unchanged(current.unit_cost)
            };

            Ok(Refreshed {
                product,
                is_ingredient: current.is_ingredient,
                outcome,
            })
        })
    }

    /// Restore `change.old_cost` unless another unit has written since
    ///
    /// Returns whether the old cost was put back.
    pub fn revert(
        &self,
        ctx: &PropagationContext,
        change: &ProductCostChanged,
    ) -> Result<bool, StoreError> {
        let tenant = ctx.tenant();
        let product = change.product_id;
        let store = self.store.as_ref();

        self.locks.with_lock(EntityKey::Product(tenant, product), || -> Result<bool, StoreError> {
            match store.product(tenant, product)? {
                Some(current) if current.unit_cost == change.new_cost => {
                    store.save_product_cost(tenant, product, change.old_cost)?;
                    debug!(%tenant, %product, chain = ctx.chain_id(), cost = %change.old_cost, "Product cost reverted");
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    /// Undo `changes`, newest first; failures are logged and skipped
    pub fn roll_back(&self, ctx: &PropagationContext, changes: &[ProductCostChanged]) {
        for change in changes.iter().rev() {
            match self.revert(ctx, change) {
                Ok(true) => {}
                Ok(false) => warn!(
                    tenant = %ctx.tenant(),
                    product = %change.product_id,
                    chain = ctx.chain_id(),
                    "Product cost rewritten by another unit, not reverting"
                ),
                Err(e) => error!(
                    tenant = %ctx.tenant(),
                    product = %change.product_id,
                    chain = ctx.chain_id(),
                    "Failed to revert product cost: {}",
                    e
                ),
            }
        }
    }
}
