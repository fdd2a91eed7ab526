//! Order line cost from item mappings
//!
//! ```text
//! item has main mapping?
//!   yes → base   = Σ(main unit cost × mapping qty) × item qty
//!         addons = Σ(option/addon unit cost × mapping qty)      (kept out of base)
//!   no  → base   = 0
//!         addons = Σ(flavor unit cost × mapping qty / flavor count)
//!                + Σ(addon unit cost × mapping qty)
//! base + addons == 0 and legacy product link → legacy unit cost × item qty
//! ```

use super::size::detect_size;
use crate::core::{round_cost, MappingType, OrderItemId, PizzaSize, StoreError, TenantId};
use crate::graph::{OrderItem, OrderItemMapping};
use crate::store::CostStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cost of one order line, split the way the order breakdown reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCost {
    pub item_id: OrderItemId,
    pub base: Decimal,
    pub addons: Decimal,
    /// Size keyword found in the item name, when flavors were priced
    pub size: Option<PizzaSize>,
    /// Number of classified flavors the add-on cost was divided among
    pub flavors: usize,
    /// Cost came from the legacy direct product link
    pub legacy_fallback: bool,
}

impl LineCost {
    fn empty(item_id: OrderItemId) -> Self {
        Self {
            item_id,
            base: Decimal::ZERO,
            addons: Decimal::ZERO,
            size: None,
            flavors: 0,
            legacy_fallback: false,
        }
    }

    pub fn total(&self) -> Decimal {
        self.base + self.addons
    }
}

/// Load the item's mappings and price the line
pub fn compute_order_line_cost(
    store: &dyn CostStore,
    tenant: TenantId,
    item: &OrderItem,
) -> Result<LineCost, StoreError> {
    let mappings = store.item_mappings(tenant, item.id)?;
    price_line(store, tenant, item, &mappings)
}

/// Price a line from already-loaded mappings
pub fn price_line(
    store: &dyn CostStore,
    tenant: TenantId,
    item: &OrderItem,
    mappings: &[OrderItemMapping],
) -> Result<LineCost, StoreError> {
    let mut line = LineCost::empty(item.id);

    let of_type = |t: MappingType| mappings.iter().filter(move |m| m.mapping_type == t);
    let has_main = of_type(MappingType::Main).next().is_some();

    if has_main {
        let mut per_unit = Decimal::ZERO;
        for mapping in of_type(MappingType::Main) {
            per_unit += mapping_unit_cost(store, tenant, mapping, None)? * mapping.quantity;
        }
        line.base = per_unit * item.quantity;

        for mapping in mappings.iter().filter(|m| m.mapping_type != MappingType::Main) {
            line.addons += mapping_unit_cost(store, tenant, mapping, None)? * mapping.quantity;
        }
    } else {
        let flavors: Vec<&OrderItemMapping> = of_type(MappingType::Option).collect();
        if !flavors.is_empty() {
            let size = detect_size(&item.name);
            let count = Decimal::from(flavors.len());
            for flavor in &flavors {
                let unit = mapping_unit_cost(store, tenant, flavor, size)?;
                line.addons += unit * flavor.quantity / count;
            }
            line.size = size;
            line.flavors = flavors.len();
            debug!(%tenant, item = %item.id, flavors = flavors.len(), size = ?size, "Priced flavors");
        }

        for addon in of_type(MappingType::Addon) {
            line.addons += mapping_unit_cost(store, tenant, addon, None)? * addon.quantity;
        }
    }

    if line.total().is_zero() {
        if let Some(legacy) = item.legacy_product_id {
            match store.product(tenant, legacy)? {
                Some(product) => {
                    line.base = product.unit_cost * item.quantity;
                    line.legacy_fallback = true;
                }
                None => warn!(%tenant, item = %item.id, product = %legacy, "Legacy product link not found"),
            }
        }
    }

    line.base = round_cost(line.base);
    line.addons = round_cost(line.addons);
    Ok(line)
}

/// Unit cost of a mapping: override, then size table, then catalog cost
///
/// A mapping whose product is missing contributes zero.
fn mapping_unit_cost(
    store: &dyn CostStore,
    tenant: TenantId,
    mapping: &OrderItemMapping,
    size: Option<PizzaSize>,
) -> Result<Decimal, StoreError> {
    if let Some(cost) = mapping.unit_cost_override {
        return Ok(cost);
    }

    match store.product(tenant, mapping.internal_product_id)? {
        Some(product) => Ok(product.cost_for_size(size).unwrap_or(product.unit_cost)),
        None => {
            warn!(
                %tenant,
                mapping = %mapping.id,
                product = %mapping.internal_product_id,
                "Mapped product not found, counting as zero cost"
            );
            Ok(Decimal::ZERO)
        }
    }
}
