//! Dashboard statistics, computed from the tables on every call.

use chrono::NaiveDate;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::{Database, DbResult};
use crate::models::{BookingStatus, Cents, InventoryFilter, StockStatus};

/// Booking counts per lifecycle status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingCounts {
    pub pending: i64,
    pub confirmed: i64,
    pub cancelled: i64,
    pub completed: i64,
}

impl BookingCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.confirmed + self.cancelled + self.completed
    }
}

/// Snapshot of clinic activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub bookings: BookingCounts,
    /// Non-cancelled bookings on the reference day
    pub todays_bookings: i64,
    pub patients: i64,
    pub medical_records: i64,
    /// Unresolved patient match flags
    pub open_match_flags: i64,
    pub inventory_items: i64,
    pub low_stock_items: i64,
    pub out_of_stock_items: i64,
    pub paid_billings: i64,
    pub partially_paid_billings: i64,
    pub unpaid_billings: i64,
    pub total_billed: Cents,
    pub total_collected: Cents,
    pub total_outstanding: Cents,
    /// Completed point-of-sale revenue
    pub pos_revenue: Cents,
}

impl DashboardStats {
    /// Compute statistics with `today` as the reference day.
    pub fn compute(db: &Database, today: &NaiveDate) -> DbResult<Self> {
        let mut bookings = BookingCounts::default();
        for (status, count) in db.count_bookings_by_status()? {
            match status {
                BookingStatus::Pending => bookings.pending = count,
                BookingStatus::Confirmed => bookings.confirmed = count,
                BookingStatus::Cancelled => bookings.cancelled = count,
                BookingStatus::Completed => bookings.completed = count,
            }
        }

        let conn = db.conn();
        let count = |sql: &str| -> DbResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        let todays_bookings: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bookings WHERE date = ?1 AND status <> 'cancelled'",
            params![today.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;

        let (paid_billings, partially_paid_billings, unpaid_billings): (i64, i64, i64) = conn.query_row(
            r#"
            SELECT COALESCE(SUM(paid = 1), 0),
                   COALESCE(SUM(paid = 0 AND amount_paid > 0), 0),
                   COALESCE(SUM(paid = 0 AND amount_paid = 0), 0)
            FROM billings
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let items = db.list_items(&InventoryFilter::default())?;
        let with_status = |status: StockStatus| items.iter().filter(|i| i.status() == status).count() as i64;
        let totals = db.billing_totals()?;

        Ok(Self {
            bookings,
            todays_bookings,
            patients: count("SELECT COUNT(*) FROM patients")?,
            medical_records: count("SELECT COUNT(*) FROM medical_records")?,
            open_match_flags: count("SELECT COUNT(*) FROM patient_match_flags WHERE resolved = 0")?,
            inventory_items: items.len() as i64,
            low_stock_items: with_status(StockStatus::LowStock),
            out_of_stock_items: with_status(StockStatus::OutOfStock),
            paid_billings,
            partially_paid_billings,
            unpaid_billings,
            total_billed: totals.billed,
            total_collected: totals.collected,
            total_outstanding: totals.outstanding,
            pos_revenue: db.completed_sales_total()?,
        })
    }
}
