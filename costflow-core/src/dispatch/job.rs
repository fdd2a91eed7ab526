//! Recalculation units

use crate::core::{OrderId, ProductId, RecalcError, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcMode {
    /// Recompute a product's own cost (and optionally every order using it)
    Product,
    /// Recompute one order's financials
    Order,
}

impl RecalcMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Order => "order",
        }
    }
}

impl fmt::Display for RecalcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecalcMode {
    type Err = RecalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(Self::Product),
            "order" => Ok(Self::Order),
            other => Err(RecalcError::UnknownMode(other.to_string())),
        }
    }
}

/// One self-contained unit of recalculation work
///
/// Carries ids only. The worker reads current graph state when it runs, so
/// duplicate or out-of-order delivery is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecalcJob {
    pub tenant_id: TenantId,
    pub target_id: u64,
    /// Product mode only: also recalculate every order referencing the product
    pub apply_to_all: bool,
    pub mode: RecalcMode,
}

impl RecalcJob {
    pub fn product(tenant_id: TenantId, product: ProductId, apply_to_all: bool) -> Self {
        Self {
            tenant_id,
            target_id: product.get(),
            apply_to_all,
            mode: RecalcMode::Product,
        }
    }

    pub fn order(tenant_id: TenantId, order: OrderId) -> Self {
        Self {
            tenant_id,
            target_id: order.get(),
            apply_to_all: false,
            mode: RecalcMode::Order,
        }
    }

    /// Build from the string-typed queue contract
    pub fn parse(
        tenant_id: TenantId,
        target_id: u64,
        apply_to_all: bool,
        mode: &str,
    ) -> Result<Self, RecalcError> {
        Ok(Self {
            tenant_id,
            target_id,
            apply_to_all,
            mode: mode.parse()?,
        })
    }
}

impl fmt::Display for RecalcJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}{}",
            self.tenant_id,
            self.mode,
            self.target_id,
            if self.apply_to_all { " (all orders)" } else { "" }
        )
    }
}
