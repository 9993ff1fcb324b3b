//! Database layer for the clinic core.

mod schema;
mod activity;
mod billing;
mod bookings;
mod inventory;
mod patients;
mod pos;
mod records;
mod services;
mod settings;

pub use schema::*;
pub use billing::BillingTotals;
pub use settings::*;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl DbError {
    /// True if this error is a UNIQUE constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            }
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken before `f` reads anything, so checks made
    /// inside `f` still hold at commit. Any error rolls the whole unit back.
    /// Must not be nested.
    pub fn write_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Database) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        let value = f(self)?;
        tx.commit().map_err(DbError::from)?;
        Ok(value)
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn format_time(time: &NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub(crate) fn parse_date(s: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DbError::Constraint(format!("Invalid stored date {}: {}", s, e)))
}

pub(crate) fn parse_optional_date(s: Option<String>) -> DbResult<Option<NaiveDate>> {
    s.as_deref().map(parse_date).transpose()
}

pub(crate) fn parse_time(s: &str) -> DbResult<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|e| DbError::Constraint(format!("Invalid stored time {}: {}", s, e)))
}

/// Upper bound (exclusive) for timestamp range filters on RFC 3339 columns.
pub(crate) fn day_after(date: &NaiveDate) -> String {
    date.succ_opt()
        .map(|d| format_date(&d))
        .unwrap_or_else(|| "9999-12-31".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "services",
            "bookings",
            "patients",
            "medical_records",
            "billings",
            "payments",
            "inventory_items",
            "stock_transactions",
            "pos_sales",
            "pos_sale_items",
            "activity_log",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_write_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();

        let result: DbResult<()> = db.write_transaction(|db| {
            db.conn().execute(
                "INSERT INTO services (service_id, name, price) VALUES ('svc', 'Consult', 100)",
                [],
            )?;
            Err(DbError::Constraint("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM services", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_unique_violation_detected() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO services (service_id, name, price) VALUES ('svc', 'Consult', 100)",
                [],
            )
            .unwrap();
        db.conn()
            .execute_batch("CREATE UNIQUE INDEX idx_test_name ON services(name)")
            .unwrap();
        let err: DbError = db
            .conn()
            .execute(
                "INSERT INTO services (service_id, name, price) VALUES ('svc2', 'Consult', 100)",
                [],
            )
            .unwrap_err()
            .into();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_date_time_formatting() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 2).unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        assert_eq!(format_date(&date), "2030-01-02");
        assert_eq!(format_time(&time), "09:30");
        assert_eq!(parse_date("2030-01-02").unwrap(), date);
        assert_eq!(parse_time("09:30").unwrap(), time);
        assert_eq!(day_after(&date), "2030-01-03");
    }
}
