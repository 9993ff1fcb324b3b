//! Filtered bulk exports for external reporting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::escape_csv;
use crate::db::{Database, DbResult};
use crate::models::{
    format_cents, Billing, BillingFilter, Booking, BookingFilter, StockTransaction,
    StockTransactionFilter,
};

/// One booking row with its service name resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingLine {
    pub booking: Booking,
    pub service_name: String,
}

/// Batch booking export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingReport {
    /// Export timestamp
    pub exported_at: String,
    pub bookings: Vec<BookingLine>,
}

impl BookingReport {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("booking_id,service,date,time,patient_name,patient_email,patient_phone,status,consultation,created_at\n");

        for line in &self.bookings {
            let b = &line.booking;
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&b.booking_id),
                escape_csv(&line.service_name),
                b.date.format("%Y-%m-%d"),
                b.time.format("%H:%M"),
                escape_csv(&b.patient_name),
                escape_csv(&b.patient_email),
                escape_csv(&b.patient_phone),
                b.status.label(),
                b.consultation_status.label(),
                escape_csv(&b.created_at),
            ));
        }

        csv
    }
}

/// Batch billing export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingReport {
    pub exported_at: String,
    pub billings: Vec<Billing>,
    /// Sum of `total_amount` over the batch
    pub total_billed: i64,
    /// Sum of `balance` over the batch
    pub total_outstanding: i64,
}

impl BillingReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Amounts are written as decimal currency.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("billing_id,booking_id,service_fee,medicine_fee,additional_fee,discount,total,paid_amount,balance,status,issued_at\n");

        for b in &self.billings {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&b.billing_id),
                escape_csv(&b.booking_id),
                format_cents(b.service_fee),
                format_cents(b.medicine_fee),
                format_cents(b.additional_fee),
                format_cents(b.discount),
                format_cents(b.total_amount),
                format_cents(b.amount_paid),
                format_cents(b.balance),
                b.status().label(),
                escape_csv(&b.issued_at),
            ));
        }

        csv
    }
}

/// One stock movement with the item name resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLine {
    pub transaction: StockTransaction,
    pub item_name: String,
}

/// Batch stock transaction export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReport {
    pub exported_at: String,
    pub transactions: Vec<StockLine>,
}

impl StockReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("transaction_id,item,type,delta,quantity_before,quantity_after,note,performed_by,created_at\n");

        for line in &self.transactions {
            let t = &line.transaction;
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&t.transaction_id),
                escape_csv(&line.item_name),
                t.transaction_type.label(),
                t.delta,
                t.quantity_before,
                t.quantity_after,
                escape_csv(&t.note),
                escape_csv(&t.performed_by),
                escape_csv(&t.created_at),
            ));
        }

        csv
    }
}

/// Report exporter.
pub struct ReportExporter<'a> {
    db: &'a Database,
}

impl<'a> ReportExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Bookings by appointment date, status and service.
    pub fn bookings(&self, filter: &BookingFilter) -> DbResult<BookingReport> {
        let names: HashMap<String, String> = self
            .db
            .list_services(false)?
            .into_iter()
            .map(|s| (s.service_id, s.name))
            .collect();

        let bookings = self
            .db
            .list_bookings(filter)?
            .into_iter()
            .map(|booking| BookingLine {
                service_name: names.get(&booking.service_id).cloned().unwrap_or_default(),
                booking,
            })
            .collect();

        Ok(BookingReport {
            exported_at: chrono::Utc::now().to_rfc3339(),
            bookings,
        })
    }

    /// Billings by issue date and paid flag.
    pub fn billings(&self, filter: &BillingFilter) -> DbResult<BillingReport> {
        let billings = self.db.list_billings(filter)?;
        Ok(BillingReport {
            exported_at: chrono::Utc::now().to_rfc3339(),
            total_billed: billings.iter().map(|b| b.total_amount).sum(),
            total_outstanding: billings.iter().map(|b| b.balance).sum(),
            billings,
        })
    }

    /// Stock movements by date, item and type.
    pub fn stock_transactions(&self, filter: &StockTransactionFilter) -> DbResult<StockReport> {
        let mut names: HashMap<String, String> = HashMap::new();
        let mut transactions = Vec::new();

        for transaction in self.db.list_stock_transactions(filter)? {
            if !names.contains_key(&transaction.item_id) {
                let name = self
                    .db
                    .get_item(&transaction.item_id)?
                    .map(|i| i.name)
                    .unwrap_or_default();
                names.insert(transaction.item_id.clone(), name);
            }
            transactions.push(StockLine {
                item_name: names.get(&transaction.item_id).cloned().unwrap_or_default(),
                transaction,
            });
        }

        Ok(StockReport {
            exported_at: chrono::Utc::now().to_rfc3339(),
            transactions,
        })
    }
}
