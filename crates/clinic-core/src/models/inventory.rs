//! Inventory models: stocked items and their audit trail.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Cents;

/// Inventory category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemCategory {
    Medicine,
    Equipment,
    Miscellaneous,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Medicine => "medicine",
            ItemCategory::Equipment => "equipment",
            ItemCategory::Miscellaneous => "miscellaneous",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "medicine" => Some(ItemCategory::Medicine),
            "equipment" => Some(ItemCategory::Equipment),
            "miscellaneous" => Some(ItemCategory::Miscellaneous),
            _ => None,
        }
    }
}

/// Stock level derived from quantity and reorder threshold. Never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// `0` → out of stock; `1..=threshold` → low; above threshold → in stock.
    pub fn derive(quantity: i64, reorder_threshold: i64) -> Self {
        if quantity <= 0 {
            StockStatus::OutOfStock
        } else if quantity <= reorder_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StockStatus::InStock => "In Stock",
            StockStatus::LowStock => "Low Stock",
            StockStatus::OutOfStock => "Out of Stock",
        }
    }
}

/// A stocked product or supply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    /// Unique item ID
    pub item_id: String,
    pub name: String,
    pub description: String,
    pub category: ItemCategory,
    /// Unit price in centavos
    pub unit_price: Cents,
    /// Quantity on hand, never negative
    pub quantity: i64,
    /// At or below this quantity the item is low on stock
    pub reorder_threshold: i64,
    /// Optional expiry date for medicines
    pub expiry_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

impl InventoryItem {
    /// Derived stock status.
    pub fn status(&self) -> StockStatus {
        StockStatus::derive(self.quantity, self.reorder_threshold)
    }
}

/// Input for creating an inventory item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NewInventoryItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ItemCategory,
    pub unit_price: Cents,
    /// Opening quantity, recorded as a stock-in transaction
    pub quantity: i64,
    pub reorder_threshold: i64,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

/// Staff edit of item details. Quantity only changes through the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ItemCategory>,
    pub unit_price: Option<Cents>,
    pub reorder_threshold: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
}

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransactionType {
    StockIn,
    StockOut,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::StockIn => "stock_in",
            TransactionType::StockOut => "stock_out",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stock_in" => Some(TransactionType::StockIn),
            "stock_out" => Some(TransactionType::StockOut),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::StockIn => "Stock In",
            TransactionType::StockOut => "Stock Out",
            TransactionType::Adjustment => "Adjustment",
        }
    }
}

/// Immutable audit record of one quantity change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockTransaction {
    pub transaction_id: String,
    pub item_id: String,
    pub transaction_type: TransactionType,
    /// Signed quantity change
    pub delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub note: String,
    pub performed_by: String,
    pub created_at: String,
}

/// Input for a direct stock adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StockAdjustment {
    pub item_id: String,
    /// Positive for stock in, negative for stock out
    pub delta: i64,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub note: String,
}

/// Filter for inventory listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryFilter {
    pub category: Option<ItemCategory>,
    pub status: Option<StockStatus>,
}

/// Filter for stock transaction queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockTransactionFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub item_id: Option<String>,
    pub transaction_type: Option<TransactionType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_derivation() {
        assert_eq!(StockStatus::derive(0, 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::derive(5, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::derive(10, 10), StockStatus::LowStock);
        assert_eq!(StockStatus::derive(11, 10), StockStatus::InStock);
        assert_eq!(StockStatus::derive(1, 0), StockStatus::InStock);
    }
}
