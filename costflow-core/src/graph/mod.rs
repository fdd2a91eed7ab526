//! Cost graph model
//!
//! Entities (ingredient, recipe component, internal product, order item
//! mapping, order) and the edges between them, plus the change sets that
//! mutation hooks report and a few traversal helpers.

pub mod changes;
pub mod entities;
pub mod source;
pub mod traverse;

pub use changes::{
    ChangeSet, CommissionField, CostRelevant, IngredientField, PaymentMappingField, ProductField,
    RecipeField, TaxCategoryField,
};
pub use entities::{
    CommissionKind, CostCommission, Ingredient, InternalProduct, Order, OrderFinancials,
    OrderItem, OrderItemMapping, PaymentMethodMapping, RecipeComponent, TaxCategory, Unit,
};
pub use source::{CostSource, PricedSource};
pub use traverse::{dependents_closure, would_create_cycle};
