//! Cost calculator
//!
//! Pure functions over the current store state. Nothing here writes; the
//! cascade and the dispatcher decide what to persist.
//!
//! - `product`: recipe CMV of an internal product
//! - `line`: cost of one order line (main, flavors, add-ons, legacy link)
//! - `order`: order totals, taxes, fees, commissions and net revenue
//! - `size`: size keyword detection used by flavor pricing

pub mod line;
pub mod order;
pub mod product;
pub mod size;

pub use line::{compute_order_line_cost, price_line, LineCost};
pub use order::{compute_order_costs, OrderCostBreakdown};
pub use product::{compute_product_cost, ProductCost};
pub use size::detect_size;
