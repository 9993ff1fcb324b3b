//! Point-of-sale models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Cents, PaymentMethod};

/// Walk-in customer or registered patient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SaleType {
    WalkIn,
    Patient,
}

impl SaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleType::WalkIn => "walk_in",
            SaleType::Patient => "patient",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "walk_in" => Some(SaleType::WalkIn),
            "patient" => Some(SaleType::Patient),
            _ => None,
        }
    }
}

/// Sale status. Pending is the draft state; stock is already reserved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SaleStatus {
    Pending,
    Completed,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SaleStatus::Pending),
            "completed" => Some(SaleStatus::Completed),
            "cancelled" => Some(SaleStatus::Cancelled),
            _ => None,
        }
    }
}

/// Discount applied to a sale subtotal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", content = "value")]
pub enum SaleDiscount {
    #[default]
    None,
    /// Whole percent, 0–100
    Percent(u8),
    /// Fixed amount in centavos
    Amount(Cents),
}

/// One cart line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CartLine {
    pub item_id: String,
    pub quantity: i64,
    /// Defaults to the item's current price
    #[serde(default)]
    pub unit_price: Option<Cents>,
}

/// Input for opening or completing a sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SaleRequest {
    pub sale_type: SaleType,
    #[serde(default)]
    pub patient_id: Option<String>,
    pub customer_name: String,
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub discount: SaleDiscount,
    pub payment_method: PaymentMethod,
    /// Tendered amount; must cover the total when present
    #[serde(default)]
    pub amount_received: Option<Cents>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub notes: String,
}

/// A retail transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PosSale {
    pub sale_id: String,
    /// Unique receipt number (`REC-YYYYMMDDHHMMSS-XXXX`)
    pub receipt_number: String,
    pub sale_type: SaleType,
    pub patient_id: Option<String>,
    pub customer_name: String,
    /// Sum of line totals
    pub subtotal: Cents,
    pub discount_amount: Cents,
    /// `subtotal - discount_amount`
    pub total_amount: Cents,
    pub payment_method: PaymentMethod,
    pub amount_received: Cents,
    pub change_amount: Cents,
    pub reference_number: Option<String>,
    pub status: SaleStatus,
    pub notes: String,
    pub created_by: String,
    pub sale_date: String,
    pub updated_at: String,
}

/// A line of a sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PosSaleItem {
    pub sale_item_id: String,
    pub sale_id: String,
    pub item_id: String,
    /// Item name at time of sale
    pub item_name: String,
    pub quantity: i64,
    /// Price per unit at time of sale
    pub unit_price: Cents,
    /// `quantity × unit_price`
    pub line_total: Cents,
}

/// A sale together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleReceipt {
    pub sale: PosSale,
    pub items: Vec<PosSaleItem>,
}

/// Filter for sale queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaleFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<SaleStatus>,
}
