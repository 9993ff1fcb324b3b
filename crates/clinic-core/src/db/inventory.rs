//! Inventory item and stock transaction operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row, ToSql};

use super::{day_after, format_date, now_rfc3339, parse_optional_date, Database, DbError, DbResult};
use crate::models::{
    InventoryFilter, InventoryItem, ItemCategory, StockTransaction, StockTransactionFilter,
    TransactionType,
};

const ITEM_COLUMNS: &str = r#"
    item_id, name, description, category, unit_price, quantity, reorder_threshold,
    expiry_date, created_at, updated_at
"#;

impl Database {
    pub fn insert_item(&self, item: &InventoryItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO inventory_items (
                item_id, name, description, category, unit_price, quantity,
                reorder_threshold, expiry_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                item.item_id,
                item.name,
                item.description,
                item.category.as_str(),
                item.unit_price,
                item.quantity,
                item.reorder_threshold,
                item.expiry_date.as_ref().map(format_date),
                item.created_at,
                item.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_item(&self, item_id: &str) -> DbResult<Option<InventoryItem>> {
        let sql = format!("SELECT {} FROM inventory_items WHERE item_id = ?", ITEM_COLUMNS);
        self.conn
            .query_row(&sql, [item_id], map_item_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Overwrite descriptive fields. Quantity only moves through stock deltas.
    pub fn update_item_details(&self, item: &InventoryItem) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE inventory_items SET
                name = ?2,
                description = ?3,
                category = ?4,
                unit_price = ?5,
                reorder_threshold = ?6,
                expiry_date = ?7,
                updated_at = ?8
            WHERE item_id = ?1
            "#,
            params![
                item.item_id,
                item.name,
                item.description,
                item.category.as_str(),
                item.unit_price,
                item.reorder_threshold,
                item.expiry_date.as_ref().map(format_date),
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Add `delta` to an item's quantity.
    ///
    /// Returns the new quantity, or `None` if the item is missing or the
    /// change would take the quantity below zero.
    pub fn apply_stock_delta(&self, item_id: &str, delta: i64) -> DbResult<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                r#"
                UPDATE inventory_items SET quantity = quantity + ?2, updated_at = ?3
                WHERE item_id = ?1 AND quantity + ?2 >= 0
                RETURNING quantity
                "#,
                params![item_id, delta, now_rfc3339()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// List items by name, optionally narrowed by category and derived status.
    pub fn list_items(&self, filter: &InventoryFilter) -> DbResult<Vec<InventoryItem>> {
        let mut sql = format!("SELECT {} FROM inventory_items WHERE 1 = 1", ITEM_COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            args.push(Box::new(category.as_str()));
        }
        sql.push_str(" ORDER BY name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_item_row)?;

        let mut items = Vec::new();
        for row in rows {
            let item: InventoryItem = row?.try_into()?;
            if filter.status.map_or(true, |status| item.status() == status) {
                items.push(item);
            }
        }
        Ok(items)
    }

    pub fn insert_stock_transaction(&self, tx: &StockTransaction) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO stock_transactions (
                transaction_id, item_id, transaction_type, delta, quantity_before,
                quantity_after, note, performed_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                tx.transaction_id,
                tx.item_id,
                tx.transaction_type.as_str(),
                tx.delta,
                tx.quantity_before,
                tx.quantity_after,
                tx.note,
                tx.performed_by,
                tx.created_at,
            ],
        )?;
        Ok(())
    }

    /// List stock transactions oldest first.
    pub fn list_stock_transactions(
        &self,
        filter: &StockTransactionFilter,
    ) -> DbResult<Vec<StockTransaction>> {
        let mut sql = String::from(
            r#"
            SELECT transaction_id, item_id, transaction_type, delta, quantity_before,
                   quantity_after, note, performed_by, created_at
            FROM stock_transactions WHERE 1 = 1
            "#,
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(from) = &filter.from {
            sql.push_str(" AND created_at >= ?");
            args.push(Box::new(format_date(from)));
        }
        if let Some(to) = &filter.to {
            sql.push_str(" AND created_at < ?");
            args.push(Box::new(day_after(to)));
        }
        if let Some(item_id) = &filter.item_id {
            sql.push_str(" AND item_id = ?");
            args.push(Box::new(item_id.clone()));
        }
        if let Some(kind) = &filter.transaction_type {
            sql.push_str(" AND transaction_type = ?");
            args.push(Box::new(kind.as_str()));
        }
        sql.push_str(" ORDER BY created_at, rowid");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok((
                StockTransaction {
                    transaction_id: row.get(0)?,
                    item_id: row.get(1)?,
                    transaction_type: TransactionType::Adjustment,
                    delta: row.get(3)?,
                    quantity_before: row.get(4)?,
                    quantity_after: row.get(5)?,
                    note: row.get(6)?,
                    performed_by: row.get(7)?,
                    created_at: row.get(8)?,
                },
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut transactions = Vec::new();
        for row in rows {
            let (mut tx, kind) = row?;
            tx.transaction_type = TransactionType::parse(&kind)
                .ok_or_else(|| DbError::Constraint(format!("Unknown transaction type: {}", kind)))?;
            transactions.push(tx);
        }
        Ok(transactions)
    }
}

/// Intermediate row for converting from SQLite.
struct ItemRow {
    item_id: String,
    name: String,
    description: String,
    category: String,
    unit_price: i64,
    quantity: i64,
    reorder_threshold: i64,
    expiry_date: Option<String>,
    created_at: String,
    updated_at: String,
}

fn map_item_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        item_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        unit_price: row.get(4)?,
        quantity: row.get(5)?,
        reorder_threshold: row.get(6)?,
        expiry_date: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl TryFrom<ItemRow> for InventoryItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let category = ItemCategory::parse(&row.category)
            .ok_or_else(|| DbError::Constraint(format!("Unknown category: {}", row.category)))?;

        Ok(InventoryItem {
            item_id: row.item_id,
            name: row.name,
            description: row.description,
            category,
            unit_price: row.unit_price,
            quantity: row.quantity,
            reorder_threshold: row.reorder_threshold,
            expiry_date: parse_optional_date(row.expiry_date)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StockStatus;

    fn item(name: &str, quantity: i64, threshold: i64) -> InventoryItem {
        let now = now_rfc3339();
        InventoryItem {
            item_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            category: ItemCategory::Medicine,
            unit_price: 2500,
            quantity,
            reorder_threshold: threshold,
            expiry_date: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_get_item() {
        let db = Database::open_in_memory().unwrap();
        let paracetamol = item("Paracetamol 500mg", 100, 10);
        db.insert_item(&paracetamol).unwrap();
        assert_eq!(db.get_item(&paracetamol.item_id).unwrap(), Some(paracetamol));
    }

    #[test]
    fn test_stock_delta_never_negative() {
        let db = Database::open_in_memory().unwrap();
        let gauze = item("Gauze", 5, 2);
        db.insert_item(&gauze).unwrap();

        assert_eq!(db.apply_stock_delta(&gauze.item_id, -3).unwrap(), Some(2));
        assert_eq!(db.apply_stock_delta(&gauze.item_id, -3).unwrap(), None);
        assert_eq!(db.apply_stock_delta(&gauze.item_id, -2).unwrap(), Some(0));
        assert_eq!(db.apply_stock_delta("missing", 1).unwrap(), None);
    }

    #[test]
    fn test_list_items_by_status() {
        let db = Database::open_in_memory().unwrap();
        db.insert_item(&item("Cetirizine", 50, 10)).unwrap();
        db.insert_item(&item("Mupirocin", 3, 10)).unwrap();
        db.insert_item(&item("Sunscreen", 0, 5)).unwrap();

        let low = db
            .list_items(&InventoryFilter {
                status: Some(StockStatus::LowStock),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Mupirocin");
        assert_eq!(db.list_items(&InventoryFilter::default()).unwrap().len(), 3);
    }

    #[test]
    fn test_stock_transactions_immutable() {
        let db = Database::open_in_memory().unwrap();
        let gauze = item("Gauze", 5, 2);
        db.insert_item(&gauze).unwrap();
        let tx = StockTransaction {
            transaction_id: "tx-1".into(),
            item_id: gauze.item_id.clone(),
            transaction_type: TransactionType::StockIn,
            delta: 5,
            quantity_before: 0,
            quantity_after: 5,
            note: "Opening stock".into(),
            performed_by: "admin".into(),
            created_at: now_rfc3339(),
        };
        db.insert_stock_transaction(&tx).unwrap();

        let listed = db
            .list_stock_transactions(&StockTransactionFilter {
                item_id: Some(gauze.item_id.clone()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(listed, vec![tx]);
        assert!(db
            .conn()
            .execute("DELETE FROM stock_transactions WHERE transaction_id = 'tx-1'", [])
            .is_err());
    }
}
