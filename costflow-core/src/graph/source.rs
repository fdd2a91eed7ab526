//! Polymorphic cost source of a recipe component
//!
//! A component consumes either a raw [`Ingredient`] or another
//! [`InternalProduct`] flagged `is_ingredient`. Both resolve to something
//! that answers [`PricedSource::unit_cost`]; callers never branch on the
//! concrete kind.

use crate::core::{IngredientId, ProductId, StoreError, TenantId};
use crate::graph::entities::{Ingredient, InternalProduct};
use crate::store::CostStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to whatever a recipe component consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CostSource {
    Ingredient(IngredientId),
    Product(ProductId),
}

impl CostSource {
    /// Product id if this source is a product used as an ingredient
    pub fn as_product(&self) -> Option<ProductId> {
        match self {
            Self::Product(id) => Some(*id),
            Self::Ingredient(_) => None,
        }
    }

    /// Load the referenced entity within `tenant`
    ///
    /// `Ok(None)` is a missing reference, not an error.
    pub fn resolve(
        &self,
        store: &dyn CostStore,
        tenant: TenantId,
    ) -> Result<Option<Box<dyn PricedSource>>, StoreError> {
        Ok(match self {
            Self::Ingredient(id) => store
                .ingredient(tenant, *id)?
                .map(|i| Box::new(i) as Box<dyn PricedSource>),
            Self::Product(id) => store
                .product(tenant, *id)?
                .map(|p| Box::new(p) as Box<dyn PricedSource>),
        })
    }
}

impl fmt::Display for CostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingredient(id) => write!(f, "{}", id),
            Self::Product(id) => write!(f, "{}", id),
        }
    }
}

/// Anything with a current unit cost
pub trait PricedSource: Send {
    fn unit_cost(&self) -> Decimal;
}

impl PricedSource for Ingredient {
    fn unit_cost(&self) -> Decimal {
        self.unit_price
    }
}

impl PricedSource for InternalProduct {
    fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }
}
