//! Medical record, prescription and image operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{format_date, now_rfc3339, parse_optional_date, Database, DbError, DbResult};
use crate::models::{ImageType, MedicalImage, MedicalRecord, Prescription};

const RECORD_COLUMNS: &str = r#"
    record_id, patient_id, booking_id, visit_date, chief_complaint, symptoms,
    diagnosis, treatment_plan, vitals, follow_up_date, notes, created_by,
    created_at, updated_at
"#;

impl Database {
    /// Insert a medical record. At most one record may reference a booking.
    pub fn insert_medical_record(&self, record: &MedicalRecord) -> DbResult<()> {
        let vitals_json = serde_json::to_string(&record.vitals)?;
        self.conn.execute(
            r#"
            INSERT INTO medical_records (
                record_id, patient_id, booking_id, visit_date, chief_complaint, symptoms,
                diagnosis, treatment_plan, vitals, follow_up_date, notes, created_by,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                record.record_id,
                record.patient_id,
                record.booking_id,
                record.visit_date,
                record.chief_complaint,
                record.symptoms,
                record.diagnosis,
                record.treatment_plan,
                vitals_json,
                record.follow_up_date.as_ref().map(format_date),
                record.notes,
                record.created_by,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Overwrite the clinical fields of a record.
    pub fn update_medical_record(&self, record: &MedicalRecord) -> DbResult<bool> {
        let vitals_json = serde_json::to_string(&record.vitals)?;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE medical_records SET
                chief_complaint = ?2,
                symptoms = ?3,
                diagnosis = ?4,
                treatment_plan = ?5,
                vitals = ?6,
                follow_up_date = ?7,
                notes = ?8,
                updated_at = ?9
            WHERE record_id = ?1
            "#,
            params![
                record.record_id,
                record.chief_complaint,
                record.symptoms,
                record.diagnosis,
                record.treatment_plan,
                vitals_json,
                record.follow_up_date.as_ref().map(format_date),
                record.notes,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn get_medical_record(&self, record_id: &str) -> DbResult<Option<MedicalRecord>> {
        let sql = format!(
            "SELECT {} FROM medical_records WHERE record_id = ?",
            RECORD_COLUMNS
        );
        self.conn
            .query_row(&sql, [record_id], map_record_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    pub fn get_record_for_booking(&self, booking_id: &str) -> DbResult<Option<MedicalRecord>> {
        let sql = format!(
            "SELECT {} FROM medical_records WHERE booking_id = ?",
            RECORD_COLUMNS
        );
        self.conn
            .query_row(&sql, [booking_id], map_record_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List a patient's records, newest visit first.
    pub fn list_records_for_patient(&self, patient_id: &str) -> DbResult<Vec<MedicalRecord>> {
        let sql = format!(
            "SELECT {} FROM medical_records WHERE patient_id = ? ORDER BY visit_date DESC",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], map_record_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.try_into()?);
        }
        Ok(records)
    }

    pub fn insert_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                prescription_id, record_id, item_id, medicine_name, quantity, dosage,
                duration, instructions, unit_price, total_price, prescribed_by, prescribed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                prescription.prescription_id,
                prescription.record_id,
                prescription.item_id,
                prescription.medicine_name,
                prescription.quantity,
                prescription.dosage,
                prescription.duration,
                prescription.instructions,
                prescription.unit_price,
                prescription.total_price,
                prescription.prescribed_by,
                prescription.prescribed_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_prescriptions(&self, record_id: &str) -> DbResult<Vec<Prescription>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT prescription_id, record_id, item_id, medicine_name, quantity, dosage,
                   duration, instructions, unit_price, total_price, prescribed_by, prescribed_at
            FROM prescriptions
            WHERE record_id = ?
            ORDER BY prescribed_at
            "#,
        )?;
        let rows = stmt.query_map([record_id], |row| {
            Ok(Prescription {
                prescription_id: row.get(0)?,
                record_id: row.get(1)?,
                item_id: row.get(2)?,
                medicine_name: row.get(3)?,
                quantity: row.get(4)?,
                dosage: row.get(5)?,
                duration: row.get(6)?,
                instructions: row.get(7)?,
                unit_price: row.get(8)?,
                total_price: row.get(9)?,
                prescribed_by: row.get(10)?,
                prescribed_at: row.get(11)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Sum of prescription totals on a record.
    pub fn prescription_total(&self, record_id: &str) -> DbResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(total_price), 0) FROM prescriptions WHERE record_id = ?",
            [record_id],
            |row| row.get(0),
        )?)
    }

    pub fn insert_medical_image(&self, image: &MedicalImage) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO medical_images (
                image_id, record_id, path, title, description, image_type,
                uploaded_by, uploaded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                image.image_id,
                image.record_id,
                image.path,
                image.title,
                image.description,
                image.image_type.as_str(),
                image.uploaded_by,
                image.uploaded_at,
            ],
        )?;
        Ok(())
    }

    pub fn list_medical_images(&self, record_id: &str) -> DbResult<Vec<MedicalImage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT image_id, record_id, path, title, description, image_type,
                   uploaded_by, uploaded_at
            FROM medical_images
            WHERE record_id = ?
            ORDER BY uploaded_at
            "#,
        )?;
        let rows = stmt.query_map([record_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut images = Vec::new();
        for row in rows {
            let (image_id, record_id, path, title, description, image_type, uploaded_by, uploaded_at) =
                row?;
            let image_type = ImageType::parse(&image_type)
                .ok_or_else(|| DbError::Constraint(format!("Unknown image type: {}", image_type)))?;
            images.push(MedicalImage {
                image_id,
                record_id,
                path,
                title,
                description,
                image_type,
                uploaded_by,
                uploaded_at,
            });
        }
        Ok(images)
    }
}

/// Intermediate row for converting from SQLite.
struct RecordRow {
    record_id: String,
    patient_id: String,
    booking_id: Option<String>,
    visit_date: String,
    chief_complaint: String,
    symptoms: String,
    diagnosis: String,
    treatment_plan: String,
    vitals: String,
    follow_up_date: Option<String>,
    notes: String,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

fn map_record_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        record_id: row.get(0)?,
        patient_id: row.get(1)?,
        booking_id: row.get(2)?,
        visit_date: row.get(3)?,
        chief_complaint: row.get(4)?,
        symptoms: row.get(5)?,
        diagnosis: row.get(6)?,
        treatment_plan: row.get(7)?,
        vitals: row.get(8)?,
        follow_up_date: row.get(9)?,
        notes: row.get(10)?,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl TryFrom<RecordRow> for MedicalRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(MedicalRecord {
            record_id: row.record_id,
            patient_id: row.patient_id,
            booking_id: row.booking_id,
            visit_date: row.visit_date,
            chief_complaint: row.chief_complaint,
            symptoms: row.symptoms,
            diagnosis: row.diagnosis,
            treatment_plan: row.treatment_plan,
            vitals: serde_json::from_str(&row.vitals)?,
            follow_up_date: parse_optional_date(row.follow_up_date)?,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
