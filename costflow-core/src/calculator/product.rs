//! Product cost-of-goods (CMV) from its recipe

use crate::core::{round_cost, ProductId, StoreError, TenantId};
use crate::store::CostStore;
use rust_decimal::Decimal;
use tracing::warn;

/// Result of walking one product's recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductCost {
    /// Σ(component unit cost × quantity), rounded to cost scale
    pub cost: Decimal,
    /// False when the product has no active component; `cost` is then zero
    /// and the stored unit_cost is authoritative
    pub has_recipe: bool,
    /// Components whose source could not be resolved
    pub missing_refs: usize,
}

/// Compute a product's cost from its active recipe components
///
/// Components that consume another product read that product's cached
/// `unit_cost`; keeping those caches fresh is the cascade's job. A component
/// pointing at its own owner is skipped.
pub fn compute_product_cost(
    store: &dyn CostStore,
    tenant: TenantId,
    product: ProductId,
) -> Result<ProductCost, StoreError> {
    let mut total = Decimal::ZERO;
    let mut has_recipe = false;
    let mut missing_refs = 0;

    for component in store.recipe(tenant, product)?.iter().filter(|c| c.active) {
        has_recipe = true;

        if component.source.as_product() == Some(product) {
            warn!(%tenant, %product, component = %component.id, "Recipe component references its own product, skipping");
            continue;
        }

        match component.source.resolve(store, tenant)? {
            Some(source) => total += source.unit_cost() * component.quantity,
            None => {
                missing_refs += 1;
                warn!(
                    %tenant,
                    %product,
                    source = %component.source,
                    "Recipe component source not found, counting as zero cost"
                );
            }
        }
    }

    Ok(ProductCost {
        cost: round_cost(total),
        has_recipe,
        missing_refs,
    })
}
