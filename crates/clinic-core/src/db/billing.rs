//! Billing and payment database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row, ToSql};

use super::{day_after, format_date, now_rfc3339, Database, DbError, DbResult};
use crate::models::{Billing, BillingFilter, Cents, Payment, PaymentMethod};

const BILLING_COLUMNS: &str = r#"
    billing_id, booking_id, service_fee, medicine_fee, additional_fee, discount,
    total_amount, amount_paid, balance, paid, notes, issued_at, updated_at
"#;

/// Aggregate billing figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BillingTotals {
    pub billed: Cents,
    pub collected: Cents,
    pub outstanding: Cents,
    pub unpaid_count: i64,
}

impl Database {
    pub fn insert_billing(&self, billing: &Billing) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO billings (
                billing_id, booking_id, service_fee, medicine_fee, additional_fee, discount,
                total_amount, amount_paid, balance, paid, notes, issued_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                billing.billing_id,
                billing.booking_id,
                billing.service_fee,
                billing.medicine_fee,
                billing.additional_fee,
                billing.discount,
                billing.total_amount,
                billing.amount_paid,
                billing.balance,
                billing.paid,
                billing.notes,
                billing.issued_at,
                billing.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_billing(&self, billing_id: &str) -> DbResult<Option<Billing>> {
        let sql = format!("SELECT {} FROM billings WHERE billing_id = ?", BILLING_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, [billing_id], map_billing)
            .optional()?)
    }

    pub fn get_billing_for_booking(&self, booking_id: &str) -> DbResult<Option<Billing>> {
        let sql = format!("SELECT {} FROM billings WHERE booking_id = ?", BILLING_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, [booking_id], map_billing)
            .optional()?)
    }

    /// Apply a payment to the running totals.
    ///
    /// Guarded on the balance: returns false instead of letting the balance
    /// go negative, whatever another writer did in between.
    pub fn apply_payment(&self, billing_id: &str, amount: Cents) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE billings SET
                amount_paid = amount_paid + ?2,
                balance = balance - ?2,
                paid = (balance - ?2 = 0),
                updated_at = ?3
            WHERE billing_id = ?1 AND balance >= ?2
            "#,
            params![billing_id, amount, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Write recomputed fees. Guarded on `amount_paid` so a payment that
    /// landed after the caller read the billing is never lost.
    pub fn update_billing_fees(&self, billing: &Billing) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE billings SET
                service_fee = ?2,
                medicine_fee = ?3,
                additional_fee = ?4,
                discount = ?5,
                total_amount = ?6,
                balance = ?7,
                paid = ?8,
                notes = ?9,
                updated_at = ?10
            WHERE billing_id = ?1 AND amount_paid = ?11
            "#,
            params![
                billing.billing_id,
                billing.service_fee,
                billing.medicine_fee,
                billing.additional_fee,
                billing.discount,
                billing.total_amount,
                billing.balance,
                billing.paid,
                billing.notes,
                now_rfc3339(),
                billing.amount_paid,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn insert_payment(&self, payment: &Payment) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO payments (
                payment_id, billing_id, amount, method, reference_number, notes,
                recorded_by, paid_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                payment.payment_id,
                payment.billing_id,
                payment.amount,
                payment.method.as_str(),
                payment.reference_number,
                payment.notes,
                payment.recorded_by,
                payment.paid_at,
            ],
        )?;
        Ok(())
    }

    /// Payments on a billing in the order they were recorded.
    pub fn list_payments(&self, billing_id: &str) -> DbResult<Vec<Payment>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT payment_id, billing_id, amount, method, reference_number, notes,
                   recorded_by, paid_at
            FROM payments
            WHERE billing_id = ?
            ORDER BY paid_at, rowid
            "#,
        )?;
        let rows = stmt.query_map([billing_id], |row| {
            Ok((
                Payment {
                    payment_id: row.get(0)?,
                    billing_id: row.get(1)?,
                    amount: row.get(2)?,
                    method: PaymentMethod::Other,
                    reference_number: row.get(4)?,
                    notes: row.get(5)?,
                    recorded_by: row.get(6)?,
                    paid_at: row.get(7)?,
                },
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut payments = Vec::new();
        for row in rows {
            let (mut payment, method) = row?;
            payment.method = PaymentMethod::parse(&method)
                .ok_or_else(|| DbError::Constraint(format!("Unknown payment method: {}", method)))?;
            payments.push(payment);
        }
        Ok(payments)
    }

    /// Sum of recorded payments on a billing.
    pub fn payments_total(&self, billing_id: &str) -> DbResult<Cents> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE billing_id = ?",
            [billing_id],
            |row| row.get(0),
        )?)
    }

    /// List billings issued in a date range, newest first.
    pub fn list_billings(&self, filter: &BillingFilter) -> DbResult<Vec<Billing>> {
        let mut sql = format!("SELECT {} FROM billings WHERE 1 = 1", BILLING_COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(from) = &filter.from {
            sql.push_str(" AND issued_at >= ?");
            args.push(Box::new(format_date(from)));
        }
        if let Some(to) = &filter.to {
            sql.push_str(" AND issued_at < ?");
            args.push(Box::new(day_after(to)));
        }
        if let Some(paid) = filter.paid {
            sql.push_str(" AND paid = ?");
            args.push(Box::new(paid));
        }
        sql.push_str(" ORDER BY issued_at DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_billing)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn billing_totals(&self) -> DbResult<BillingTotals> {
        Ok(self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(total_amount), 0), COALESCE(SUM(amount_paid), 0),
                   COALESCE(SUM(balance), 0), COALESCE(SUM(paid = 0), 0)
            FROM billings
            "#,
            [],
            |row| {
                Ok(BillingTotals {
                    billed: row.get(0)?,
                    collected: row.get(1)?,
                    outstanding: row.get(2)?,
                    unpaid_count: row.get(3)?,
                })
            },
        )?)
    }
}

fn map_billing(row: &Row<'_>) -> rusqlite::Result<Billing> {
    Ok(Billing {
        billing_id: row.get(0)?,
        booking_id: row.get(1)?,
        service_fee: row.get(2)?,
        medicine_fee: row.get(3)?,
        additional_fee: row.get(4)?,
        discount: row.get(5)?,
        total_amount: row.get(6)?,
        amount_paid: row.get(7)?,
        balance: row.get(8)?,
        paid: row.get(9)?,
        notes: row.get(10)?,
        issued_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
