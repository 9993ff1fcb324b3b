//! Clinic settings and blocked-date operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{format_date, now_rfc3339, parse_date, Database, DbResult};
use crate::config::ClinicRules;

/// A date on which the clinic takes no bookings (holiday, closure).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedDate {
    pub date: NaiveDate,
    pub reason: String,
    pub created_by: Option<String>,
    pub created_at: String,
}

impl Database {
    /// Persist the clinic rules, replacing any previous version.
    pub fn save_rules(&self, rules: &ClinicRules) -> DbResult<()> {
        let json = serde_json::to_string(rules)?;
        self.conn.execute(
            r#"
            INSERT INTO clinic_settings (id, rules, updated_at) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET rules = excluded.rules, updated_at = excluded.updated_at
            "#,
            params![json, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Load the stored clinic rules, if any were saved.
    pub fn load_rules(&self) -> DbResult<Option<ClinicRules>> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT rules FROM clinic_settings WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Block a date. Returns false if it was already blocked.
    pub fn add_blocked_date(
        &self,
        date: &NaiveDate,
        reason: &str,
        created_by: Option<&str>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO blocked_dates (date, reason, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![format_date(date), reason, created_by, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn remove_blocked_date(&self, date: &NaiveDate) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM blocked_dates WHERE date = ?", [format_date(date)])?;
        Ok(rows_affected > 0)
    }

    pub fn get_blocked_date(&self, date: &NaiveDate) -> DbResult<Option<BlockedDate>> {
        self.conn
            .query_row(
                "SELECT reason, created_by, created_at FROM blocked_dates WHERE date = ?",
                [format_date(date)],
                |row| {
                    Ok(BlockedDate {
                        date: *date,
                        reason: row.get(0)?,
                        created_by: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// List blocked dates in chronological order.
    pub fn list_blocked_dates(&self) -> DbResult<Vec<BlockedDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, reason, created_by, created_at FROM blocked_dates ORDER BY date",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut dates = Vec::new();
        for row in rows {
            let (date, reason, created_by, created_at) = row?;
            dates.push(BlockedDate {
                date: parse_date(&date)?,
                reason,
                created_by,
                created_at,
            });
        }
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_absent_until_saved() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_rules().unwrap().is_none());

        let mut rules = ClinicRules::default();
        rules.slot_minutes = 15;
        db.save_rules(&rules).unwrap();
        assert_eq!(db.load_rules().unwrap(), Some(rules.clone()));

        rules.min_lead_days = 2;
        db.save_rules(&rules).unwrap();
        assert_eq!(db.load_rules().unwrap().unwrap().min_lead_days, 2);
    }

    #[test]
    fn test_blocked_dates() {
        let db = Database::open_in_memory().unwrap();
        let holiday = NaiveDate::from_ymd_opt(2030, 12, 25).unwrap();

        assert!(db.get_blocked_date(&holiday).unwrap().is_none());
        assert!(db.add_blocked_date(&holiday, "Christmas", Some("admin")).unwrap());
        assert!(!db.add_blocked_date(&holiday, "Christmas", None).unwrap());
        assert_eq!(db.get_blocked_date(&holiday).unwrap().unwrap().reason, "Christmas");

        let listed = db.list_blocked_dates().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].reason, "Christmas");

        assert!(db.remove_blocked_date(&holiday).unwrap());
        assert!(db.get_blocked_date(&holiday).unwrap().is_none());
    }
}
