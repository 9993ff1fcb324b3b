//! Money and stock ledgers: billing, inventory and point of sale.

mod billing;
mod inventory;
mod pos;

pub use billing::*;
pub use inventory::*;
pub use pos::*;

pub(crate) use billing::store_fees;
pub(crate) use inventory::move_stock;
