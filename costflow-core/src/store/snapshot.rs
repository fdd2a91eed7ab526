//! Serializable dump of a tenant's cost graph
//!
//! Used to seed an [`InMemoryStore`](super::InMemoryStore) from JSON (replay
//! tool, fixtures) and to export it back.

use crate::graph::{
    CostCommission, Ingredient, InternalProduct, Order, OrderItem, OrderItemMapping,
    PaymentMethodMapping, RecipeComponent, TaxCategory,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub ingredients: Vec<Ingredient>,
    pub products: Vec<InternalProduct>,
    pub recipe: Vec<RecipeComponent>,
    pub tax_categories: Vec<TaxCategory>,
    pub commissions: Vec<CostCommission>,
    pub payment_mappings: Vec<PaymentMethodMapping>,
    pub orders: Vec<Order>,
    pub items: Vec<OrderItem>,
    pub mappings: Vec<OrderItemMapping>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse snapshot JSON")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{IngredientId, TenantId};

    #[test]
    fn test_partial_snapshot_defaults_missing_tables() {
        let json = r#"{
            "ingredients": [
                {"id": 1, "tenant_id": 7, "name": "Mozzarella", "unit": "kg", "unit_price": "38.90"}
            ]
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();

        assert_eq!(snapshot.ingredients.len(), 1);
        assert_eq!(snapshot.ingredients[0].id, IngredientId::new(1));
        assert_eq!(snapshot.ingredients[0].tenant_id, TenantId::new(7));
        assert!(snapshot.products.is_empty());
        assert!(snapshot.orders.is_empty());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Snapshot::load("/nonexistent/snapshot.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read snapshot"));
    }
}
