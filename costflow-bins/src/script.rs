//! Mutation scripts for the replay tool
//!
//! A script is a JSON array of edits, each tagged with `op`:
//!
//! ```json
//! [
//!   {"op": "ingredient_price", "tenant_id": 1, "ingredient_id": 3, "unit_price": "2.50"},
//!   {"op": "recalculate", "tenant_id": 1, "target_id": 10, "mode": "order"}
//! ]
//! ```
//!
//! Each edit is written to the store first and then reported to the change
//! detector, the same order a persistence hook runs in.

use anyhow::{bail, Context, Result};
use costflow_core::core::{
    CommissionId, IngredientId, OrderId, OrderStatus, ProductId, RecipeComponentId,
    TaxCategoryId, TenantId,
};
use costflow_core::graph::{
    ChangeSet, CostCommission, Ingredient, InternalProduct, RecipeComponent, RecipeField,
    TaxCategory,
};
use costflow_core::{CostEngine, CostStore, InMemoryStore, RecalcJob};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    IngredientPrice {
        tenant_id: u64,
        ingredient_id: u64,
        unit_price: Decimal,
    },
    /// Only meaningful for products without a recipe
    ProductCost {
        tenant_id: u64,
        product_id: u64,
        unit_cost: Decimal,
    },
    RecipeQuantity {
        tenant_id: u64,
        component_id: u64,
        quantity: Decimal,
    },
    ComponentActive {
        tenant_id: u64,
        component_id: u64,
        active: bool,
    },
    AddComponent {
        component: RecipeComponent,
    },
    TaxRates {
        tenant_id: u64,
        tax_category_id: u64,
        rates: BTreeMap<String, Decimal>,
    },
    CommissionPercentage {
        tenant_id: u64,
        commission_id: u64,
        percentage: Decimal,
    },
    OrderStatusChange {
        tenant_id: u64,
        order_id: u64,
        status: OrderStatus,
    },
    /// Enqueue a unit directly
    Recalculate {
        tenant_id: u64,
        target_id: u64,
        mode: String,
        #[serde(default)]
        apply_to_all: bool,
    },
}

pub fn load_script<P: AsRef<Path>>(path: P) -> Result<Vec<Mutation>> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse script {}", path.display()))
}

impl Mutation {
    /// Write the edit and report it; returns the units the detector enqueued
    pub fn apply(&self, store: &InMemoryStore, engine: &CostEngine) -> Result<usize> {
        let detector = engine.detector();

        let enqueued = match self {
            Self::IngredientPrice {
                tenant_id,
                ingredient_id,
                unit_price,
            } => {
                let (before, after) = store
                    .update_ingredient(TenantId::new(*tenant_id), IngredientId::new(*ingredient_id), |i| {
                        i.unit_price = *unit_price
                    })
                    .with_context(|| format!("ingredient {} not found", ingredient_id))?;
                detector.on_ingredient_updated(&after, &Ingredient::diff(&before, &after))?
            }
            Self::ProductCost {
                tenant_id,
                product_id,
                unit_cost,
            } => {
                let (before, after) = store
                    .update_product(TenantId::new(*tenant_id), ProductId::new(*product_id), |p| {
                        p.unit_cost = *unit_cost
                    })
                    .with_context(|| format!("product {} not found", product_id))?;
                detector.on_product_updated(&after, &InternalProduct::diff(&before, &after))?
            }
            Self::RecipeQuantity {
                tenant_id,
                component_id,
                quantity,
            } => {
                let (before, after) = store
                    .update_component(TenantId::new(*tenant_id), RecipeComponentId::new(*component_id), |c| {
                        c.quantity = *quantity
                    })
                    .with_context(|| format!("recipe component {} not found", component_id))?;
                detector.on_product_recipe_changed(&after, &RecipeComponent::diff(&before, &after))?
            }
            Self::ComponentActive {
                tenant_id,
                component_id,
                active,
            } => {
                let (before, after) = store
                    .update_component(TenantId::new(*tenant_id), RecipeComponentId::new(*component_id), |c| {
                        c.active = *active
                    })
                    .with_context(|| format!("recipe component {} not found", component_id))?;
                detector.on_product_recipe_changed(&after, &RecipeComponent::diff(&before, &after))?
            }
            Self::AddComponent { component } => {
                store.upsert_component(component.clone());
                detector.on_product_recipe_changed(component, &ChangeSet::new().with(RecipeField::Existence))?
            }
            Self::TaxRates {
                tenant_id,
                tax_category_id,
                rates,
            } => {
                let tenant = TenantId::new(*tenant_id);
                let Some(before) = store.tax_category(tenant, TaxCategoryId::new(*tax_category_id))? else {
                    bail!("tax category {} not found", tax_category_id);
                };
                let after = TaxCategory {
                    rates: rates.clone(),
                    ..before.clone()
                };
                store.upsert_tax_category(after.clone());
                detector.on_tax_category_updated(&after, &TaxCategory::diff(&before, &after))?
            }
            Self::CommissionPercentage {
                tenant_id,
                commission_id,
                percentage,
            } => {
                let tenant = TenantId::new(*tenant_id);
                let Some(before) = store.commission(tenant, CommissionId::new(*commission_id))? else {
                    bail!("commission {} not found", commission_id);
                };
                let after = CostCommission {
                    percentage: *percentage,
                    ..before.clone()
                };
                store.upsert_commission(after.clone());
                detector.on_cost_commission_updated(&after, &CostCommission::diff(&before, &after))?
            }
            Self::OrderStatusChange {
                tenant_id,
                order_id,
                status,
            } => {
                let (before, after) = store
                    .update_order(TenantId::new(*tenant_id), OrderId::new(*order_id), |o| o.status = *status)
                    .with_context(|| format!("order {} not found", order_id))?;
                detector.on_order_status_changed(&after, before.status)?
            }
            Self::Recalculate {
                tenant_id,
                target_id,
                mode,
                apply_to_all,
            } => {
                let job = RecalcJob::parse(TenantId::new(*tenant_id), *target_id, *apply_to_all, mode)?;
                engine.submit(job)?;
                1
            }
        };
        Ok(enqueued)
    }
}
