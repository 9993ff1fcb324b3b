//! Point of sale.
//!
//! A sale is opened as a Pending draft that already holds its stock, then
//! finalized with the tender or cancelled. Cancelling puts the stock back;
//! a completed sale is final.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audit::ActivityLog;
use crate::db::{now_rfc3339, Database};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    format_cents, percent_of, ActivityAction, Cents, InventoryItem, PaymentMethod, PosSale,
    PosSaleItem, SaleDiscount, SaleFilter, SaleReceipt, SaleRequest, SaleStatus, SaleType,
    TransactionType,
};

use super::inventory::move_stock;

const WALK_IN_CUSTOMER: &str = "Walk-in Customer";
const RECEIPT_ATTEMPTS: usize = 5;

/// Payment details supplied when a draft sale is finalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Tender {
    pub payment_method: PaymentMethod,
    /// Defaults to the exact total
    #[serde(default)]
    pub amount_received: Option<Cents>,
    #[serde(default)]
    pub reference_number: Option<String>,
}

/// Amount taken off a subtotal.
pub fn discount_amount(subtotal: Cents, discount: SaleDiscount) -> ClinicResult<Cents> {
    match discount {
        SaleDiscount::None => Ok(0),
        SaleDiscount::Percent(percent) if percent > 100 => Err(ClinicError::InvalidAmount {
            amount: i64::from(percent),
            reason: "discount percent must be between 0 and 100".into(),
        }),
        SaleDiscount::Percent(percent) => Ok(percent_of(subtotal, percent)),
        SaleDiscount::Amount(amount) if amount < 0 => Err(ClinicError::InvalidAmount {
            amount,
            reason: "discount cannot be negative".into(),
        }),
        SaleDiscount::Amount(amount) if amount > subtotal => Err(ClinicError::InvalidAmount {
            amount,
            reason: format!("discount exceeds the subtotal of {}", format_cents(subtotal)),
        }),
        SaleDiscount::Amount(amount) => Ok(amount),
    }
}

/// Amount received and change due for a total.
pub fn settle_tender(total: Cents, amount_received: Option<Cents>) -> ClinicResult<(Cents, Cents)> {
    let received = amount_received.unwrap_or(total);
    if received < total {
        return Err(ClinicError::InvalidAmount {
            amount: received,
            reason: format!("amount received is less than the total of {}", format_cents(total)),
        });
    }
    Ok((received, received - total))
}

fn check_request(request: &SaleRequest) -> ClinicResult<()> {
    if request.lines.is_empty() {
        return Err(ClinicError::invalid_input("lines", "a sale needs at least one item"));
    }
    for line in &request.lines {
        if line.quantity <= 0 {
            return Err(ClinicError::invalid_input(
                "quantity",
                format!("must be positive for item {}", line.item_id),
            ));
        }
        if let Some(price) = line.unit_price {
            if price < 0 {
                return Err(ClinicError::InvalidAmount {
                    amount: price,
                    reason: "unit price cannot be negative".into(),
                });
            }
        }
    }
    if request.sale_type == SaleType::Patient && request.patient_id.is_none() {
        return Err(ClinicError::invalid_input("patient_id", "required for a patient sale"));
    }
    Ok(())
}

fn new_receipt_number(db: &Database) -> ClinicResult<String> {
    for _ in 0..RECEIPT_ATTEMPTS {
        let suffix = uuid::Uuid::new_v4().simple().to_string()[..4].to_uppercase();
        let candidate = format!("REC-{}-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"), suffix);
        if !db.receipt_exists(&candidate)? {
            return Ok(candidate);
        }
        debug!(receipt = %candidate, "receipt number collision");
    }
    Err(ClinicError::Integrity {
        operation: "open sale".into(),
        reason: "could not allocate a unique receipt number".into(),
    })
}

/// Create the draft sale and reserve its stock. Must run inside a write transaction.
fn open_in(db: &Database, request: &SaleRequest, actor: &str) -> ClinicResult<SaleReceipt> {
    let customer_name = match (&request.sale_type, &request.patient_id) {
        (SaleType::Patient, Some(patient_id)) => {
            let patient = db
                .get_patient(patient_id)?
                .ok_or_else(|| ClinicError::not_found("Patient", patient_id))?;
            if request.customer_name.trim().is_empty() {
                patient.full_name
            } else {
                request.customer_name.trim().to_string()
            }
        }
        _ if request.customer_name.trim().is_empty() => WALK_IN_CUSTOMER.to_string(),
        _ => request.customer_name.trim().to_string(),
    };

    // Every line is checked against stock before anything moves.
    let mut items: BTreeMap<&str, InventoryItem> = BTreeMap::new();
    let mut requested: BTreeMap<&str, i64> = BTreeMap::new();
    for line in &request.lines {
        if !items.contains_key(line.item_id.as_str()) {
            let item = db
                .get_item(&line.item_id)?
                .ok_or_else(|| ClinicError::not_found("Inventory item", &line.item_id))?;
            items.insert(line.item_id.as_str(), item);
        }
        let total = requested.entry(line.item_id.as_str()).or_insert(0);
        *total = total
            .checked_add(line.quantity)
            .ok_or_else(|| ClinicError::invalid_input("quantity", "quantity is out of range"))?;
    }
    for (item_id, quantity) in &requested {
        let available = items.get(item_id).map(|i| i.quantity).unwrap_or(0);
        if *quantity > available {
            return Err(ClinicError::InsufficientStock {
                item_id: item_id.to_string(),
                requested: *quantity,
                available,
            });
        }
    }

    let sale_id = uuid::Uuid::new_v4().to_string();
    let mut lines = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        let Some(item) = items.get(line.item_id.as_str()) else {
            return Err(ClinicError::not_found("Inventory item", &line.item_id));
        };
        let unit_price = line.unit_price.unwrap_or(item.unit_price);
        let line_total = unit_price
            .checked_mul(line.quantity)
            .ok_or_else(|| ClinicError::out_of_range(unit_price, "line total"))?;
        lines.push(PosSaleItem {
            sale_item_id: uuid::Uuid::new_v4().to_string(),
            sale_id: sale_id.clone(),
            item_id: item.item_id.clone(),
            item_name: item.name.clone(),
            quantity: line.quantity,
            unit_price,
            line_total,
        });
    }

    let subtotal = lines
        .iter()
        .try_fold(0 as Cents, |acc, l| acc.checked_add(l.line_total))
        .ok_or_else(|| ClinicError::out_of_range(Cents::MAX, "sale subtotal"))?;
    let discount = discount_amount(subtotal, request.discount)?;
    let now = now_rfc3339();
    let sale = PosSale {
        sale_id,
        receipt_number: new_receipt_number(db)?,
        sale_type: request.sale_type,
        patient_id: request.patient_id.clone(),
        customer_name,
        subtotal,
        discount_amount: discount,
        total_amount: subtotal - discount,
        payment_method: request.payment_method,
        amount_received: 0,
        change_amount: 0,
        reference_number: request.reference_number.clone(),
        status: SaleStatus::Pending,
        notes: request.notes.clone(),
        created_by: actor.to_string(),
        sale_date: now.clone(),
        updated_at: now,
    };
    db.insert_sale(&sale)?;

    let note = format!("Sale {}", sale.receipt_number);
    for line in &lines {
        db.insert_sale_item(line)?;
        move_stock(db, &line.item_id, -line.quantity, TransactionType::StockOut, &note, actor)?;
    }

    ActivityLog::new(db).append(
        actor,
        ActivityAction::Create,
        "pos_sale",
        &sale.sale_id,
        format!(
            "Opened sale {} for {} ({} items, total {})",
            sale.receipt_number,
            sale.customer_name,
            lines.len(),
            format_cents(sale.total_amount)
        ),
    )?;
    Ok(SaleReceipt { sale, items: lines })
}

/// Record the tender and complete a draft. Must run inside a write transaction.
fn finalize_in(db: &Database, sale_id: &str, tender: &Tender, actor: &str) -> ClinicResult<SaleReceipt> {
    let sale = db
        .get_sale(sale_id)?
        .ok_or_else(|| ClinicError::not_found("Sale", sale_id))?;
    if sale.status != SaleStatus::Pending {
        return Err(ClinicError::SaleNotPending {
            receipt_number: sale.receipt_number,
            status: sale.status,
        });
    }

    let (received, change) = settle_tender(sale.total_amount, tender.amount_received)?;
    let completed = db.complete_pending_sale(
        sale_id,
        tender.payment_method,
        received,
        change,
        tender.reference_number.as_deref(),
    )?;
    if !completed {
        return Err(ClinicError::Integrity {
            operation: "finalize sale".into(),
            reason: format!("sale {} changed during the update", sale.receipt_number),
        });
    }

    ActivityLog::new(db).append(
        actor,
        ActivityAction::Sale,
        "pos_sale",
        sale_id,
        format!(
            "Completed sale {}: total {}, received {}, change {}",
            sale.receipt_number,
            format_cents(sale.total_amount),
            format_cents(received),
            format_cents(change)
        ),
    )?;
    receipt(db, sale_id)
}

fn receipt(db: &Database, sale_id: &str) -> ClinicResult<SaleReceipt> {
    let sale = db
        .get_sale(sale_id)?
        .ok_or_else(|| ClinicError::not_found("Sale", sale_id))?;
    let items = db.list_sale_items(sale_id)?;
    Ok(SaleReceipt { sale, items })
}

/// Point-of-sale engine bound to a database.
pub struct PointOfSale<'a> {
    db: &'a Database,
}

impl<'a> PointOfSale<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Open a draft sale, reserving stock for every line.
    pub fn open_sale(&self, request: &SaleRequest, actor: &str) -> ClinicResult<SaleReceipt> {
        check_request(request)?;
        let receipt = self.db.write_transaction(|db| open_in(db, request, actor))?;
        info!(
            sale_id = %receipt.sale.sale_id,
            receipt = %receipt.sale.receipt_number,
            total = receipt.sale.total_amount,
            "sale opened"
        );
        Ok(receipt)
    }

    /// Complete a draft sale.
    pub fn finalize_sale(&self, sale_id: &str, tender: &Tender, actor: &str) -> ClinicResult<SaleReceipt> {
        let receipt = self
            .db
            .write_transaction(|db| finalize_in(db, sale_id, tender, actor))?;
        info!(receipt = %receipt.sale.receipt_number, "sale completed");
        Ok(receipt)
    }

    /// Open and complete a sale in one unit of work.
    pub fn complete_sale(&self, request: &SaleRequest, actor: &str) -> ClinicResult<SaleReceipt> {
        check_request(request)?;
        let tender = Tender {
            payment_method: request.payment_method,
            amount_received: request.amount_received,
            reference_number: request.reference_number.clone(),
        };
        let receipt = self.db.write_transaction(|db| {
            let draft = open_in(db, request, actor)?;
            finalize_in(db, &draft.sale.sale_id, &tender, actor)
        })?;
        info!(
            sale_id = %receipt.sale.sale_id,
            receipt = %receipt.sale.receipt_number,
            total = receipt.sale.total_amount,
            "sale completed"
        );
        Ok(receipt)
    }

    /// Cancel a draft sale and return its stock.
    pub fn cancel_sale(&self, sale_id: &str, actor: &str) -> ClinicResult<SaleReceipt> {
        let receipt = self.db.write_transaction(|db| {
            let sale = db
                .get_sale(sale_id)?
                .ok_or_else(|| ClinicError::not_found("Sale", sale_id))?;
            if sale.status != SaleStatus::Pending || !db.cancel_pending_sale(sale_id)? {
                return Err(ClinicError::SaleNotCancellable(sale.receipt_number));
            }

            let note = format!("Cancelled sale {}", sale.receipt_number);
            for line in db.list_sale_items(sale_id)? {
                move_stock(db, &line.item_id, line.quantity, TransactionType::StockIn, &note, actor)?;
            }
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Cancel,
                "pos_sale",
                sale_id,
                format!("Cancelled sale {}", sale.receipt_number),
            )?;
            receipt(db, sale_id)
        })?;
        info!(receipt = %receipt.sale.receipt_number, "sale cancelled");
        Ok(receipt)
    }

    pub fn get_sale(&self, sale_id: &str) -> ClinicResult<SaleReceipt> {
        receipt(self.db, sale_id)
    }

    pub fn list(&self, filter: &SaleFilter) -> ClinicResult<Vec<PosSale>> {
        Ok(self.db.list_sales(filter)?)
    }
}
