//! Booking database operations.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, params_from_iter, OptionalExtension, Row, ToSql};

use super::{format_date, format_time, now_rfc3339, parse_date, parse_time};
use super::{Database, DbError, DbResult};
use crate::models::{Booking, BookingFilter, BookingStatus, ConsultationStatus, Slot};

const BOOKING_COLUMNS: &str = r#"
    booking_id, service_id, patient_name, patient_email, patient_phone,
    date, time, status, consultation_status, notes, created_by, created_at, updated_at
"#;

impl Database {
    /// Insert a booking. Fails with a unique violation if the slot is held.
    pub fn insert_booking(&self, booking: &Booking) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO bookings (
                booking_id, service_id, patient_name, patient_email, patient_phone,
                date, time, status, consultation_status, notes, created_by,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                booking.booking_id,
                booking.service_id,
                booking.patient_name,
                booking.patient_email,
                booking.patient_phone,
                format_date(&booking.date),
                format_time(&booking.time),
                booking.status.as_str(),
                booking.consultation_status.as_str(),
                booking.notes,
                booking.created_by,
                booking.created_at,
                booking.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_booking(&self, booking_id: &str) -> DbResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE booking_id = ?", BOOKING_COLUMNS);
        self.conn
            .query_row(&sql, [booking_id], map_booking_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// True if a non-cancelled booking holds this slot.
    pub fn is_slot_taken(&self, slot: &Slot) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM bookings
            WHERE service_id = ?1 AND date = ?2 AND time = ?3 AND status <> 'cancelled'
            "#,
            params![
                slot.service_id,
                format_date(&slot.date),
                format_time(&slot.time)
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Start times already held for a service on a date.
    pub fn taken_times(&self, service_id: &str, date: &NaiveDate) -> DbResult<Vec<NaiveTime>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT time FROM bookings
            WHERE service_id = ?1 AND date = ?2 AND status <> 'cancelled'
            ORDER BY time
            "#,
        )?;
        let rows = stmt.query_map(params![service_id, format_date(date)], |row| {
            row.get::<_, String>(0)
        })?;

        let mut times = Vec::new();
        for row in rows {
            times.push(parse_time(&row?)?);
        }
        Ok(times)
    }

    /// Move a booking from `expected` to `next`.
    ///
    /// Returns false if the booking is no longer in `expected`, so a
    /// concurrent transition can never be overwritten.
    pub fn transition_booking_status(
        &self,
        booking_id: &str,
        expected: BookingStatus,
        next: BookingStatus,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE bookings SET status = ?3, updated_at = ?4
            WHERE booking_id = ?1 AND status = ?2
            "#,
            params![booking_id, expected.as_str(), next.as_str(), now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Advance the consultation of a confirmed booking from `expected` to `next`.
    pub fn transition_consultation_status(
        &self,
        booking_id: &str,
        expected: ConsultationStatus,
        next: ConsultationStatus,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE bookings SET consultation_status = ?3, updated_at = ?4
            WHERE booking_id = ?1 AND status = 'confirmed' AND consultation_status = ?2
            "#,
            params![booking_id, expected.as_str(), next.as_str(), now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Mark a confirmed booking completed, closing its consultation.
    pub fn complete_booking(&self, booking_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE bookings SET status = 'completed', consultation_status = 'done', updated_at = ?2
            WHERE booking_id = ?1 AND status = 'confirmed'
            "#,
            params![booking_id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Hard-delete a booking that is still pending.
    pub fn delete_pending_booking(&self, booking_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM bookings WHERE booking_id = ? AND status = 'pending'",
            [booking_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// List bookings matching a filter, ordered by date and time.
    pub fn list_bookings(&self, filter: &BookingFilter) -> DbResult<Vec<Booking>> {
        let mut sql = format!("SELECT {} FROM bookings WHERE 1 = 1", BOOKING_COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(from) = &filter.from {
            sql.push_str(" AND date >= ?");
            args.push(Box::new(format_date(from)));
        }
        if let Some(to) = &filter.to {
            sql.push_str(" AND date <= ?");
            args.push(Box::new(format_date(to)));
        }
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status.as_str()));
        }
        if let Some(service_id) = &filter.service_id {
            sql.push_str(" AND service_id = ?");
            args.push(Box::new(service_id.clone()));
        }
        sql.push_str(" ORDER BY date, time");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_booking_row)?;

        let mut bookings = Vec::new();
        for row in rows {
            bookings.push(row?.try_into()?);
        }
        Ok(bookings)
    }

    /// Count bookings per status.
    pub fn count_bookings_by_status(&self) -> DbResult<Vec<(BookingStatus, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM bookings GROUP BY status ORDER BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (status, count) = row?;
            counts.push((parse_booking_status(&status)?, count));
        }
        Ok(counts)
    }
}

/// Intermediate row for converting from SQLite.
struct BookingRow {
    booking_id: String,
    service_id: String,
    patient_name: String,
    patient_email: String,
    patient_phone: String,
    date: String,
    time: String,
    status: String,
    consultation_status: String,
    notes: String,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

fn map_booking_row(row: &Row<'_>) -> rusqlite::Result<BookingRow> {
    Ok(BookingRow {
        booking_id: row.get(0)?,
        service_id: row.get(1)?,
        patient_name: row.get(2)?,
        patient_email: row.get(3)?,
        patient_phone: row.get(4)?,
        date: row.get(5)?,
        time: row.get(6)?,
        status: row.get(7)?,
        consultation_status: row.get(8)?,
        notes: row.get(9)?,
        created_by: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn parse_booking_status(s: &str) -> DbResult<BookingStatus> {
    BookingStatus::parse(s).ok_or_else(|| DbError::Constraint(format!("Unknown booking status: {}", s)))
}

impl TryFrom<BookingRow> for Booking {
    type Error = DbError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let consultation_status = ConsultationStatus::parse(&row.consultation_status)
            .ok_or_else(|| {
                DbError::Constraint(format!(
                    "Unknown consultation status: {}",
                    row.consultation_status
                ))
            })?;

        Ok(Booking {
            booking_id: row.booking_id,
            service_id: row.service_id,
            patient_name: row.patient_name,
            patient_email: row.patient_email,
            patient_phone: row.patient_phone,
            date: parse_date(&row.date)?,
            time: parse_time(&row.time)?,
            status: parse_booking_status(&row.status)?,
            consultation_status,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
