//! Inventory ledger.
//!
//! Quantity only changes through [`move_stock`], which writes the matching
//! stock transaction in the same unit of work. Status is never stored; it
//! is derived from quantity and threshold on read.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::ActivityLog;
use crate::db::{now_rfc3339, Database};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{
    ActivityAction, InventoryFilter, InventoryItem, ItemUpdate, NewInventoryItem, StockAdjustment,
    StockTransaction, StockTransactionFilter, TransactionType,
};

/// An item after a quantity change, with the transaction that recorded it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    pub item: InventoryItem,
    pub transaction: StockTransaction,
}

/// Check that a delta's sign agrees with its transaction type.
pub fn check_delta(delta: i64, transaction_type: TransactionType) -> ClinicResult<()> {
    if delta == 0 {
        return Err(ClinicError::InvalidAmount {
            amount: delta,
            reason: "stock change cannot be zero".into(),
        });
    }
    match transaction_type {
        TransactionType::StockIn if delta < 0 => Err(ClinicError::invalid_input(
            "delta",
            "Stock In must add stock",
        )),
        TransactionType::StockOut if delta > 0 => Err(ClinicError::invalid_input(
            "delta",
            "Stock Out must remove stock",
        )),
        _ => Ok(()),
    }
}

/// Apply a quantity change and record it. Must run inside a write transaction.
pub(crate) fn move_stock(
    db: &Database,
    item_id: &str,
    delta: i64,
    transaction_type: TransactionType,
    note: &str,
    actor: &str,
) -> ClinicResult<StockMovement> {
    let mut item = db
        .get_item(item_id)?
        .ok_or_else(|| ClinicError::not_found("Inventory item", item_id))?;

    let insufficient = |available: i64| ClinicError::InsufficientStock {
        item_id: item_id.to_string(),
        requested: -delta,
        available,
    };
    if item.quantity + delta < 0 {
        return Err(insufficient(item.quantity));
    }

    let quantity_after = match db.apply_stock_delta(item_id, delta)? {
        Some(quantity) => quantity,
        None => {
            let available = db.get_item(item_id)?.map(|i| i.quantity).unwrap_or(0);
            return Err(insufficient(available));
        }
    };

    let transaction = StockTransaction {
        transaction_id: uuid::Uuid::new_v4().to_string(),
        item_id: item_id.to_string(),
        transaction_type,
        delta,
        quantity_before: quantity_after - delta,
        quantity_after,
        note: note.to_string(),
        performed_by: actor.to_string(),
        created_at: now_rfc3339(),
    };
    db.insert_stock_transaction(&transaction)?;

    item.quantity = quantity_after;
    Ok(StockMovement { item, transaction })
}

fn validate_item_fields(name: &str, unit_price: i64, reorder_threshold: i64) -> ClinicResult<()> {
    if name.trim().is_empty() {
        return Err(ClinicError::invalid_input("name", "is required"));
    }
    if unit_price < 0 {
        return Err(ClinicError::InvalidAmount {
            amount: unit_price,
            reason: "unit price cannot be negative".into(),
        });
    }
    if reorder_threshold < 0 {
        return Err(ClinicError::invalid_input(
            "reorder_threshold",
            "cannot be negative",
        ));
    }
    Ok(())
}

/// Inventory ledger bound to a database.
pub struct InventoryLedger<'a> {
    db: &'a Database,
}

impl<'a> InventoryLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Add an item to the catalogue. Opening stock is recorded as Stock In.
    pub fn create_item(&self, new_item: &NewInventoryItem, actor: &str) -> ClinicResult<InventoryItem> {
        validate_item_fields(&new_item.name, new_item.unit_price, new_item.reorder_threshold)?;
        if new_item.quantity < 0 {
            return Err(ClinicError::invalid_input("quantity", "cannot be negative"));
        }

        let now = now_rfc3339();
        let mut item = InventoryItem {
            item_id: uuid::Uuid::new_v4().to_string(),
            name: new_item.name.trim().to_string(),
            description: new_item.description.clone(),
            category: new_item.category,
            unit_price: new_item.unit_price,
            quantity: 0,
            reorder_threshold: new_item.reorder_threshold,
            expiry_date: new_item.expiry_date,
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.write_transaction(|db| {
            db.insert_item(&item)?;
            if new_item.quantity > 0 {
                let movement = move_stock(
                    db,
                    &item.item_id,
                    new_item.quantity,
                    TransactionType::StockIn,
                    "Opening stock",
                    actor,
                )?;
                item.quantity = movement.item.quantity;
            }
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Create,
                "inventory_item",
                &item.item_id,
                format!("Added {} ({} on hand)", item.name, item.quantity),
            )?;
            Ok::<_, ClinicError>(())
        })?;

        info!(item_id = %item.item_id, name = %item.name, "inventory item created");
        Ok(item)
    }

    /// Change descriptive fields and reorder threshold.
    pub fn update_item(&self, item_id: &str, update: &ItemUpdate, actor: &str) -> ClinicResult<InventoryItem> {
        self.db.write_transaction(|db| {
            let mut item = db
                .get_item(item_id)?
                .ok_or_else(|| ClinicError::not_found("Inventory item", item_id))?;

            if let Some(name) = &update.name {
                item.name = name.trim().to_string();
            }
            if let Some(description) = &update.description {
                item.description = description.clone();
            }
            if let Some(category) = update.category {
                item.category = category;
            }
            if let Some(unit_price) = update.unit_price {
                item.unit_price = unit_price;
            }
            if let Some(threshold) = update.reorder_threshold {
                item.reorder_threshold = threshold;
            }
            if update.expiry_date.is_some() {
                item.expiry_date = update.expiry_date;
            }
            validate_item_fields(&item.name, item.unit_price, item.reorder_threshold)?;

            db.update_item_details(&item)?;
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Update,
                "inventory_item",
                item_id,
                format!("Updated {}", item.name),
            )?;
            Ok(item)
        })
    }

    /// Change stock on hand by `delta`.
    pub fn adjust_stock(&self, adjustment: &StockAdjustment, actor: &str) -> ClinicResult<StockMovement> {
        check_delta(adjustment.delta, adjustment.transaction_type)?;

        let movement = self.db.write_transaction(|db| {
            let movement = move_stock(
                db,
                &adjustment.item_id,
                adjustment.delta,
                adjustment.transaction_type,
                &adjustment.note,
                actor,
            )?;
            ActivityLog::new(db).append(
                actor,
                ActivityAction::StockAdjust,
                "inventory_item",
                &adjustment.item_id,
                format!(
                    "{} {:+} {} ({} -> {})",
                    adjustment.transaction_type.label(),
                    adjustment.delta,
                    movement.item.name,
                    movement.transaction.quantity_before,
                    movement.transaction.quantity_after
                ),
            )?;
            Ok::<_, ClinicError>(movement)
        })?;

        info!(
            item_id = %adjustment.item_id,
            delta = adjustment.delta,
            quantity = movement.item.quantity,
            status = movement.item.status().label(),
            "stock adjusted"
        );
        Ok(movement)
    }

    pub fn get_item(&self, item_id: &str) -> ClinicResult<InventoryItem> {
        self.db
            .get_item(item_id)?
            .ok_or_else(|| ClinicError::not_found("Inventory item", item_id))
    }

    pub fn list_items(&self, filter: &InventoryFilter) -> ClinicResult<Vec<InventoryItem>> {
        Ok(self.db.list_items(filter)?)
    }

    pub fn transactions(&self, filter: &StockTransactionFilter) -> ClinicResult<Vec<StockTransaction>> {
        Ok(self.db.list_stock_transactions(filter)?)
    }
}
