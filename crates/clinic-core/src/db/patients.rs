//! Patient and match-flag database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{format_date, now_rfc3339, parse_optional_date, Database, DbError, DbResult};
use crate::models::{BloodType, Patient, PatientMatchFlag};

const PATIENT_COLUMNS: &str = r#"
    patient_id, user_account, full_name, email, phone, date_of_birth, address,
    blood_type, allergies, current_medications, medical_history, created_at, updated_at
"#;

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                patient_id, user_account, full_name, email, phone, phone_digits,
                date_of_birth, address, blood_type, allergies, current_medications,
                medical_history, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                patient.patient_id,
                patient.user_account,
                patient.full_name,
                patient.email,
                patient.phone,
                patient.phone_digits(),
                patient.date_of_birth.as_ref().map(format_date),
                patient.address,
                patient.blood_type.as_str(),
                patient.allergies,
                patient.current_medications,
                patient.medical_history,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient's profile.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                user_account = ?2,
                full_name = ?3,
                email = ?4,
                phone = ?5,
                phone_digits = ?6,
                date_of_birth = ?7,
                address = ?8,
                blood_type = ?9,
                allergies = ?10,
                current_medications = ?11,
                medical_history = ?12,
                updated_at = ?13
            WHERE patient_id = ?1
            "#,
            params![
                patient.patient_id,
                patient.user_account,
                patient.full_name,
                patient.email,
                patient.phone,
                patient.phone_digits(),
                patient.date_of_birth.as_ref().map(format_date),
                patient.address,
                patient.blood_type.as_str(),
                patient.allergies,
                patient.current_medications,
                patient.medical_history,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, patient_id: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {} FROM patients WHERE patient_id = ?", PATIENT_COLUMNS);
        self.conn
            .query_row(&sql, [patient_id], map_patient_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Patients whose email matches, ignoring case.
    pub fn find_patients_by_email(&self, email: &str) -> DbResult<Vec<Patient>> {
        self.query_patients(
            &format!(
                "SELECT {} FROM patients WHERE lower(email) = lower(?) ORDER BY created_at",
                PATIENT_COLUMNS
            ),
            email,
        )
    }

    /// Patients whose phone has the same digits.
    pub fn find_patients_by_phone(&self, phone_digits: &str) -> DbResult<Vec<Patient>> {
        if phone_digits.is_empty() {
            return Ok(Vec::new());
        }
        self.query_patients(
            &format!(
                "SELECT {} FROM patients WHERE phone_digits = ? ORDER BY created_at",
                PATIENT_COLUMNS
            ),
            phone_digits,
        )
    }

    /// Search patients by name, email or phone (substring match).
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("%{}%", query);
        let sql = format!(
            r#"
            SELECT {} FROM patients
            WHERE full_name LIKE ?1 OR email LIKE ?1 OR phone LIKE ?1
            ORDER BY full_name
            LIMIT ?2
            "#,
            PATIENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, limit as i64], map_patient_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    fn query_patients(&self, sql: &str, arg: &str) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([arg], map_patient_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// Record an ambiguous patient match for staff review.
    pub fn insert_match_flag(&self, flag: &PatientMatchFlag) -> DbResult<()> {
        let candidates = serde_json::to_string(&flag.candidate_ids)?;
        self.conn.execute(
            r#"
            INSERT INTO patient_match_flags (
                flag_id, booking_id, patient_id, candidate_ids, reason, resolved, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                flag.flag_id,
                flag.booking_id,
                flag.patient_id,
                candidates,
                flag.reason,
                flag.resolved,
                flag.created_at,
            ],
        )?;
        Ok(())
    }

    /// List match flags, newest first.
    pub fn list_match_flags(&self, unresolved_only: bool) -> DbResult<Vec<PatientMatchFlag>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT flag_id, booking_id, patient_id, candidate_ids, reason, resolved, created_at
            FROM patient_match_flags
            WHERE (?1 = 0 OR resolved = 0)
            ORDER BY created_at DESC
            "#,
        )?;
        let rows = stmt.query_map([unresolved_only], |row| {
            Ok((
                PatientMatchFlag {
                    flag_id: row.get(0)?,
                    booking_id: row.get(1)?,
                    patient_id: row.get(2)?,
                    candidate_ids: Vec::new(),
                    reason: row.get(4)?,
                    resolved: row.get(5)?,
                    created_at: row.get(6)?,
                },
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut flags = Vec::new();
        for row in rows {
            let (mut flag, candidates) = row?;
            flag.candidate_ids = serde_json::from_str(&candidates)?;
            flags.push(flag);
        }
        Ok(flags)
    }

    pub fn resolve_match_flag(&self, flag_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE patient_match_flags SET resolved = 1 WHERE flag_id = ? AND resolved = 0",
            [flag_id],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row for converting from SQLite.
struct PatientRow {
    patient_id: String,
    user_account: Option<String>,
    full_name: String,
    email: String,
    phone: String,
    date_of_birth: Option<String>,
    address: String,
    blood_type: String,
    allergies: String,
    current_medications: String,
    medical_history: String,
    created_at: String,
    updated_at: String,
}

fn map_patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        patient_id: row.get(0)?,
        user_account: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        date_of_birth: row.get(5)?,
        address: row.get(6)?,
        blood_type: row.get(7)?,
        allergies: row.get(8)?,
        current_medications: row.get(9)?,
        medical_history: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let blood_type = BloodType::parse(&row.blood_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown blood type: {}", row.blood_type)))?;

        Ok(Patient {
            patient_id: row.patient_id,
            user_account: row.user_account,
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
            date_of_birth: parse_optional_date(row.date_of_birth)?,
            address: row.address,
            blood_type,
            allergies: row.allergies,
            current_medications: row.current_medications,
            medical_history: row.medical_history,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();
        let mut patient = Patient::new(
            "Ana Reyes".into(),
            "ana@example.com".into(),
            "0917-123-4567".into(),
        );
        patient.date_of_birth = NaiveDate::from_ymd_opt(1990, 5, 1);
        patient.blood_type = BloodType::OPositive;
        db.insert_patient(&patient).unwrap();

        let fetched = db.get_patient(&patient.patient_id).unwrap().unwrap();
        assert_eq!(fetched, patient);
    }

    #[test]
    fn test_update_patient() {
        let db = setup_db();
        let mut patient = Patient::new("Ana Reyes".into(), "ana@example.com".into(), "0917".into());
        db.insert_patient(&patient).unwrap();

        patient.allergies = "Penicillin".into();
        patient.phone = "0918 000 1111".into();
        assert!(db.update_patient(&patient).unwrap());

        let fetched = db.get_patient(&patient.patient_id).unwrap().unwrap();
        assert_eq!(fetched.allergies, "Penicillin");
        assert_eq!(db.find_patients_by_phone("09180001111").unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_email_ignores_case() {
        let db = setup_db();
        let patient = Patient::new("Ana Reyes".into(), "Ana@Example.com".into(), "0917".into());
        db.insert_patient(&patient).unwrap();

        let found = db.find_patients_by_email("ana@example.COM").unwrap();
        assert_eq!(found.len(), 1);
        assert!(db.find_patients_by_email("other@example.com").unwrap().is_empty());
    }

    #[test]
    fn test_find_by_phone_digits() {
        let db = setup_db();
        let patient = Patient::new("Ana Reyes".into(), "ana@example.com".into(), "(0917) 123-4567".into());
        db.insert_patient(&patient).unwrap();

        assert_eq!(db.find_patients_by_phone("09171234567").unwrap().len(), 1);
        assert!(db.find_patients_by_phone("").unwrap().is_empty());
    }

    #[test]
    fn test_search_patients() {
        let db = setup_db();
        for (name, email) in [("Ana Reyes", "ana@x.com"), ("Ben Cruz", "ben@x.com")] {
            db.insert_patient(&Patient::new(name.into(), email.into(), "0917".into()))
                .unwrap();
        }
        let results = db.search_patients("Cruz", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].full_name, "Ben Cruz");
    }
}
