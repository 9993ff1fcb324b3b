//! Point-of-sale database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row, ToSql};

use super::{day_after, format_date, now_rfc3339, Database, DbError, DbResult};
use crate::models::{Cents, PaymentMethod, PosSale, PosSaleItem, SaleFilter, SaleStatus, SaleType};

const SALE_COLUMNS: &str = r#"
    sale_id, receipt_number, sale_type, patient_id, customer_name, subtotal,
    discount_amount, total_amount, payment_method, amount_received, change_amount,
    reference_number, status, notes, created_by, sale_date, updated_at
"#;

impl Database {
    pub fn insert_sale(&self, sale: &PosSale) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO pos_sales (
                sale_id, receipt_number, sale_type, patient_id, customer_name, subtotal,
                discount_amount, total_amount, payment_method, amount_received, change_amount,
                reference_number, status, notes, created_by, sale_date, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                sale.sale_id,
                sale.receipt_number,
                sale.sale_type.as_str(),
                sale.patient_id,
                sale.customer_name,
                sale.subtotal,
                sale.discount_amount,
                sale.total_amount,
                sale.payment_method.as_str(),
                sale.amount_received,
                sale.change_amount,
                sale.reference_number,
                sale.status.as_str(),
                sale.notes,
                sale.created_by,
                sale.sale_date,
                sale.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_sale_item(&self, item: &PosSaleItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO pos_sale_items (
                sale_item_id, sale_id, item_id, item_name, quantity, unit_price, line_total
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                item.sale_item_id,
                item.sale_id,
                item.item_id,
                item.item_name,
                item.quantity,
                item.unit_price,
                item.line_total,
            ],
        )?;
        Ok(())
    }

    pub fn get_sale(&self, sale_id: &str) -> DbResult<Option<PosSale>> {
        let sql = format!("SELECT {} FROM pos_sales WHERE sale_id = ?", SALE_COLUMNS);
        self.conn
            .query_row(&sql, [sale_id], map_sale_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    pub fn receipt_exists(&self, receipt_number: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pos_sales WHERE receipt_number = ?",
            [receipt_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_sale_items(&self, sale_id: &str) -> DbResult<Vec<PosSaleItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT sale_item_id, sale_id, item_id, item_name, quantity, unit_price, line_total
            FROM pos_sale_items
            WHERE sale_id = ?
            ORDER BY rowid
            "#,
        )?;
        let rows = stmt.query_map([sale_id], |row| {
            Ok(PosSaleItem {
                sale_item_id: row.get(0)?,
                sale_id: row.get(1)?,
                item_id: row.get(2)?,
                item_name: row.get(3)?,
                quantity: row.get(4)?,
                unit_price: row.get(5)?,
                line_total: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Record the tender on a pending sale and mark it completed.
    pub fn complete_pending_sale(
        &self,
        sale_id: &str,
        payment_method: PaymentMethod,
        amount_received: Cents,
        change_amount: Cents,
        reference_number: Option<&str>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE pos_sales SET
                payment_method = ?2,
                amount_received = ?3,
                change_amount = ?4,
                reference_number = COALESCE(?5, reference_number),
                status = 'completed',
                updated_at = ?6
            WHERE sale_id = ?1 AND status = 'pending'
            "#,
            params![
                sale_id,
                payment_method.as_str(),
                amount_received,
                change_amount,
                reference_number,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Cancel a sale that is still pending.
    pub fn cancel_pending_sale(&self, sale_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE pos_sales SET status = 'cancelled', updated_at = ?2 WHERE sale_id = ?1 AND status = 'pending'",
            params![sale_id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// List sales newest first.
    pub fn list_sales(&self, filter: &SaleFilter) -> DbResult<Vec<PosSale>> {
        let mut sql = format!("SELECT {} FROM pos_sales WHERE 1 = 1", SALE_COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(from) = &filter.from {
            sql.push_str(" AND sale_date >= ?");
            args.push(Box::new(format_date(from)));
        }
        if let Some(to) = &filter.to {
            sql.push_str(" AND sale_date < ?");
            args.push(Box::new(day_after(to)));
        }
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY sale_date DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_sale_row)?;

        let mut sales = Vec::new();
        for row in rows {
            sales.push(row?.try_into()?);
        }
        Ok(sales)
    }

    /// Revenue from completed sales.
    pub fn completed_sales_total(&self) -> DbResult<Cents> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(total_amount), 0) FROM pos_sales WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )?)
    }
}

/// Intermediate row for converting from SQLite.
struct SaleRow {
    sale_id: String,
    receipt_number: String,
    sale_type: String,
    patient_id: Option<String>,
    customer_name: String,
    subtotal: i64,
    discount_amount: i64,
    total_amount: i64,
    payment_method: String,
    amount_received: i64,
    change_amount: i64,
    reference_number: Option<String>,
    status: String,
    notes: String,
    created_by: String,
    sale_date: String,
    updated_at: String,
}

fn map_sale_row(row: &Row<'_>) -> rusqlite::Result<SaleRow> {
    Ok(SaleRow {
        sale_id: row.get(0)?,
        receipt_number: row.get(1)?,
        sale_type: row.get(2)?,
        patient_id: row.get(3)?,
        customer_name: row.get(4)?,
        subtotal: row.get(5)?,
        discount_amount: row.get(6)?,
        total_amount: row.get(7)?,
        payment_method: row.get(8)?,
        amount_received: row.get(9)?,
        change_amount: row.get(10)?,
        reference_number: row.get(11)?,
        status: row.get(12)?,
        notes: row.get(13)?,
        created_by: row.get(14)?,
        sale_date: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

impl TryFrom<SaleRow> for PosSale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        let sale_type = SaleType::parse(&row.sale_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown sale type: {}", row.sale_type)))?;
        let payment_method = PaymentMethod::parse(&row.payment_method).ok_or_else(|| {
            DbError::Constraint(format!("Unknown payment method: {}", row.payment_method))
        })?;
        let status = SaleStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown sale status: {}", row.status)))?;

        Ok(PosSale {
            sale_id: row.sale_id,
            receipt_number: row.receipt_number,
            sale_type,
            patient_id: row.patient_id,
            customer_name: row.customer_name,
            subtotal: row.subtotal,
            discount_amount: row.discount_amount,
            total_amount: row.total_amount,
            payment_method,
            amount_received: row.amount_received,
            change_amount: row.change_amount,
            reference_number: row.reference_number,
            status,
            notes: row.notes,
            created_by: row.created_by,
            sale_date: row.sale_date,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(receipt: &str) -> PosSale {
        let now = now_rfc3339();
        PosSale {
            sale_id: uuid::Uuid::new_v4().to_string(),
            receipt_number: receipt.into(),
            sale_type: SaleType::WalkIn,
            patient_id: None,
            customer_name: "Walk-in".into(),
            subtotal: 10000,
            discount_amount: 0,
            total_amount: 10000,
            payment_method: PaymentMethod::Cash,
            amount_received: 0,
            change_amount: 0,
            reference_number: None,
            status: SaleStatus::Pending,
            notes: String::new(),
            created_by: "cashier".into(),
            sale_date: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_get_sale() {
        let db = Database::open_in_memory().unwrap();
        let s = sale("REC-20300102090000-AB12");
        db.insert_sale(&s).unwrap();
        assert_eq!(db.get_sale(&s.sale_id).unwrap(), Some(s.clone()));
        assert!(db.receipt_exists(&s.receipt_number).unwrap());
        assert!(db.insert_sale(&sale(&s.receipt_number)).unwrap_err().is_unique_violation());
    }

    #[test]
    fn test_pending_sale_transitions() {
        let db = Database::open_in_memory().unwrap();
        let s = sale("REC-1");
        db.insert_sale(&s).unwrap();

        assert!(db
            .complete_pending_sale(&s.sale_id, PaymentMethod::Cash, 20000, 10000, None)
            .unwrap());
        assert!(!db.cancel_pending_sale(&s.sale_id).unwrap());

        let completed = db.get_sale(&s.sale_id).unwrap().unwrap();
        assert_eq!(completed.status, SaleStatus::Completed);
        assert_eq!(completed.change_amount, 10000);
        assert_eq!(db.completed_sales_total().unwrap(), 10000);

        let listed = db
            .list_sales(&SaleFilter {
                status: Some(SaleStatus::Completed),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
