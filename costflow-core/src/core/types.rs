//! Identifiers and small enums shared by every layer of the engine
//!
//! Every id is a `Copy` newtype over `u64`. Ids are only meaningful together
//! with a [`TenantId`]: the store never resolves an id outside the tenant it
//! was queried for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[inline(always)]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[inline(always)]
            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Tenant (restaurant account); the partition key of every entity
    TenantId,
    "tenant"
);
entity_id!(IngredientId, "ingredient");
entity_id!(
    /// Internal (recipe) product
    ProductId,
    "product"
);
entity_id!(RecipeComponentId, "component");
entity_id!(OrderId, "order");
entity_id!(OrderItemId, "item");
entity_id!(MappingId, "mapping");
entity_id!(PaymentMappingId, "payment-mapping");
entity_id!(CommissionId, "commission");
entity_id!(TaxCategoryId, "tax-category");

/// Delivery marketplace an order came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marketplace {
    Ifood,
    Rappi,
    UberEats,
    Takeat,
}

impl Marketplace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ifood => "ifood",
            Self::Rappi => "rappi",
            Self::UberEats => "uber_eats",
            Self::Takeat => "takeat",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of an [`OrderItemMapping`](crate::graph::OrderItemMapping) within its item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    /// Determines the item's base cost
    Main,
    /// Classified flavor (e.g. one half of a pizza)
    Option,
    /// Extra priced on top of the item
    Addon,
}

/// Kind of change reported for row-level hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Order lifecycle status as reported by the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Confirmed,
    Dispatched,
    Concluded,
    Cancelled,
}

impl OrderStatus {
    /// Concluded and cancelled orders keep the financials they closed with
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Concluded | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::Confirmed => "confirmed",
            Self::Dispatched => "dispatched",
            Self::Concluded => "concluded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pizza size recognised in an item's display name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PizzaSize {
    Broto,
    Individual,
    Pequena,
    Media,
    Grande,
    Gigante,
    Familia,
}

impl PizzaSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broto => "broto",
            Self::Individual => "individual",
            Self::Pequena => "pequena",
            Self::Media => "media",
            Self::Grande => "grande",
            Self::Gigante => "gigante",
            Self::Familia => "familia",
        }
    }
}

impl FromStr for PizzaSize {
    type Err = ();

    /// Accepts the keyword with or without its accent, any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "broto" => Ok(Self::Broto),
            "individual" => Ok(Self::Individual),
            "pequena" => Ok(Self::Pequena),
            "media" | "média" => Ok(Self::Media),
            "grande" => Ok(Self::Grande),
            "gigante" => Ok(Self::Gigante),
            "familia" | "família" => Ok(Self::Familia),
            _ => Err(()),
        }
    }
}
