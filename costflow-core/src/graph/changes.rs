//! Field-level change sets reported by mutation hooks
//!
//! Each entity has a field enum. [`CostRelevant`] is the fixed predicate
//! deciding whether a change to that field can move any cost; edits that
//! touch only non-relevant fields produce no downstream work.

use crate::graph::entities::{
    CostCommission, Ingredient, InternalProduct, PaymentMethodMapping, RecipeComponent,
    TaxCategory,
};
use std::collections::BTreeSet;

/// Whether a changed field can affect a computed cost
pub trait CostRelevant {
    fn is_cost_relevant(&self) -> bool;
}

/// Set of changed fields of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet<F: Ord> {
    fields: BTreeSet<F>,
}

impl<F: Ord> Default for ChangeSet<F> {
    fn default() -> Self {
        Self {
            fields: BTreeSet::new(),
        }
    }
}

impl<F: Ord + Copy + CostRelevant> ChangeSet<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: F) -> Self {
        self.fields.insert(field);
        self
    }

    pub fn insert(&mut self, field: F) {
        self.fields.insert(field);
    }

    pub fn contains(&self, field: F) -> bool {
        self.fields.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        self.fields.iter().copied()
    }

    /// True when at least one changed field is cost-relevant
    pub fn is_cost_relevant(&self) -> bool {
        self.fields.iter().any(CostRelevant::is_cost_relevant)
    }
}

impl<F: Ord> FromIterator<F> for ChangeSet<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

macro_rules! record_if_changed {
    ($set:ident, $old:ident, $new:ident, $($field:ident => $variant:expr),+ $(,)?) => {
        $(
            if $old.$field != $new.$field {
                $set.insert($variant);
            }
        )+
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IngredientField {
    Name,
    Unit,
    UnitPrice,
}

impl CostRelevant for IngredientField {
    fn is_cost_relevant(&self) -> bool {
        matches!(self, Self::UnitPrice)
    }
}

impl Ingredient {
    pub fn diff(old: &Self, new: &Self) -> ChangeSet<IngredientField> {
        let mut set = ChangeSet::new();
        record_if_changed!(set, old, new,
            name => IngredientField::Name,
            unit => IngredientField::Unit,
            unit_price => IngredientField::UnitPrice,
        );
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProductField {
    Name,
    UnitCost,
    IsIngredient,
    TaxCategory,
    SizeCosts,
}

impl CostRelevant for ProductField {
    fn is_cost_relevant(&self) -> bool {
        matches!(self, Self::UnitCost | Self::TaxCategory | Self::SizeCosts)
    }
}

impl InternalProduct {
    pub fn diff(old: &Self, new: &Self) -> ChangeSet<ProductField> {
        let mut set = ChangeSet::new();
        record_if_changed!(set, old, new,
            name => ProductField::Name,
            unit_cost => ProductField::UnitCost,
            is_ingredient => ProductField::IsIngredient,
            tax_category_id => ProductField::TaxCategory,
            size_costs => ProductField::SizeCosts,
        );
        set
    }
}

/// Recipe component fields; `Existence` marks a created or deleted row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecipeField {
    Quantity,
    Source,
    Active,
    Existence,
}

impl CostRelevant for RecipeField {
    fn is_cost_relevant(&self) -> bool {
        true
    }
}

impl RecipeComponent {
    pub fn diff(old: &Self, new: &Self) -> ChangeSet<RecipeField> {
        let mut set = ChangeSet::new();
        record_if_changed!(set, old, new,
            quantity => RecipeField::Quantity,
            source => RecipeField::Source,
            active => RecipeField::Active,
        );
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PaymentMappingField {
    ExternalMethod,
    Fee,
    NoFee,
    Category,
}

impl CostRelevant for PaymentMappingField {
    fn is_cost_relevant(&self) -> bool {
        matches!(self, Self::Fee | Self::NoFee | Self::Category)
    }
}

impl PaymentMethodMapping {
    pub fn diff(old: &Self, new: &Self) -> ChangeSet<PaymentMappingField> {
        let mut set = ChangeSet::new();
        record_if_changed!(set, old, new,
            external_method => PaymentMappingField::ExternalMethod,
            cost_commission_id => PaymentMappingField::Fee,
            no_fee => PaymentMappingField::NoFee,
            category => PaymentMappingField::Category,
        );
        set
    }
}

/// Tax category fields
///
/// `Rates` records any edit of the component table; `TotalRate` is only
/// recorded when the effective rate moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaxCategoryField {
    Name,
    Rates,
    TotalRate,
}

impl CostRelevant for TaxCategoryField {
    fn is_cost_relevant(&self) -> bool {
        matches!(self, Self::TotalRate)
    }
}

impl TaxCategory {
    pub fn diff(old: &Self, new: &Self) -> ChangeSet<TaxCategoryField> {
        let mut set = ChangeSet::new();
        record_if_changed!(set, old, new,
            name => TaxCategoryField::Name,
            rates => TaxCategoryField::Rates,
        );
        if old.total_rate() != new.total_rate() {
            set.insert(TaxCategoryField::TotalRate);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommissionField {
    Name,
    Kind,
    Marketplace,
    Percentage,
    FixedAmount,
}

impl CostRelevant for CommissionField {
    fn is_cost_relevant(&self) -> bool {
        !matches!(self, Self::Name)
    }
}

impl CostCommission {
    pub fn diff(old: &Self, new: &Self) -> ChangeSet<CommissionField> {
        let mut set = ChangeSet::new();
        record_if_changed!(set, old, new,
            name => CommissionField::Name,
            kind => CommissionField::Kind,
            marketplace => CommissionField::Marketplace,
            percentage => CommissionField::Percentage,
            fixed_amount => CommissionField::FixedAmount,
        );
        set
    }
}
