//! Patient lookup-or-create for accepted bookings.
//!
//! Matching is best-effort. Only a lone email match whose name agrees is
//! reused silently. Anything weaker is either reused with a review flag or
//! creates a new patient with one; the core never merges patients on its own.

use strsim::jaro_winkler;

use crate::audit::ActivityLog;
use crate::db::{Database, DbResult};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{phone_digits, ActivityAction, Patient, PatientContact, PatientMatchFlag};

/// Minimum name similarity for reusing a match without review.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

/// How the patient for a booking was found.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Single email match with a similar name
    Email,
    /// Single email match under a different name; reused but flagged
    EmailNameDiffers { similarity: f64 },
    /// Single phone match with a similar name; reused but flagged
    PhoneOnly { similarity: f64 },
    /// No candidates
    New,
    /// Candidates existed but none was safe to reuse; new patient, flagged
    Ambiguous { candidate_ids: Vec<String> },
}

impl MatchOutcome {
    /// Reason text for a reconciliation flag, if one is needed.
    pub fn flag_reason(&self) -> Option<String> {
        match self {
            MatchOutcome::Email | MatchOutcome::New => None,
            MatchOutcome::EmailNameDiffers { similarity } => Some(format!(
                "Matched by email under a different name (name similarity {:.2})",
                similarity
            )),
            MatchOutcome::PhoneOnly { similarity } => Some(format!(
                "Matched by phone only (name similarity {:.2})",
                similarity
            )),
            MatchOutcome::Ambiguous { candidate_ids } => Some(format!(
                "{} possible existing patient(s); created a new record",
                candidate_ids.len()
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatientResolution {
    pub patient: Patient,
    pub created: bool,
    pub outcome: MatchOutcome,
    /// Every patient that matched on email or phone
    pub candidate_ids: Vec<String>,
}

/// Find the patient for a contact, creating one if no safe match exists.
pub fn resolve_patient(db: &Database, contact: &PatientContact) -> DbResult<PatientResolution> {
    let by_email = db.find_patients_by_email(&contact.email)?;
    let by_phone = db.find_patients_by_phone(&phone_digits(&contact.phone))?;

    let mut candidates: Vec<Patient> = by_email.clone();
    for patient in by_phone.iter() {
        if !candidates.iter().any(|c| c.patient_id == patient.patient_id) {
            candidates.push(patient.clone());
        }
    }
    let candidate_ids: Vec<String> = candidates.iter().map(|p| p.patient_id.clone()).collect();

    // A phone pointing at someone else makes the email match unsafe.
    if by_email.len() == 1 && candidates.len() == 1 {
        let similarity = name_similarity(&by_email[0].full_name, &contact.name);
        let outcome = if similarity >= NAME_SIMILARITY_THRESHOLD {
            MatchOutcome::Email
        } else {
            MatchOutcome::EmailNameDiffers { similarity }
        };
        return Ok(PatientResolution {
            patient: by_email[0].clone(),
            created: false,
            outcome,
            candidate_ids,
        });
    }

    if by_email.is_empty() && by_phone.len() == 1 {
        let similarity = name_similarity(&by_phone[0].full_name, &contact.name);
        if similarity >= NAME_SIMILARITY_THRESHOLD {
            return Ok(PatientResolution {
                patient: by_phone[0].clone(),
                created: false,
                outcome: MatchOutcome::PhoneOnly { similarity },
                candidate_ids,
            });
        }
    }

    let patient = Patient::new(
        contact.name.clone(),
        contact.email.clone(),
        contact.phone.clone(),
    );
    db.insert_patient(&patient)?;

    let outcome = if candidate_ids.is_empty() {
        MatchOutcome::New
    } else {
        MatchOutcome::Ambiguous {
            candidate_ids: candidate_ids.clone(),
        }
    };

    Ok(PatientResolution {
        patient,
        created: true,
        outcome,
        candidate_ids,
    })
}

fn name_similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&normalize_name(a), &normalize_name(b))
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Patient lookups and reconciliation of match flags.
pub struct PatientRegistry<'a> {
    db: &'a Database,
}

impl<'a> PatientRegistry<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(&self, patient_id: &str) -> ClinicResult<Patient> {
        self.db
            .get_patient(patient_id)?
            .ok_or_else(|| ClinicError::not_found("Patient", patient_id))
    }

    pub fn search(&self, query: &str, limit: usize) -> ClinicResult<Vec<Patient>> {
        Ok(self.db.search_patients(query, limit)?)
    }

    pub fn match_flags(&self, unresolved_only: bool) -> ClinicResult<Vec<PatientMatchFlag>> {
        Ok(self.db.list_match_flags(unresolved_only)?)
    }

    /// Mark a flag reviewed. Merging records, if any, is left to staff.
    pub fn resolve_flag(&self, flag_id: &str, actor: &str) -> ClinicResult<()> {
        self.db.write_transaction(|db| {
            if !db.resolve_match_flag(flag_id)? {
                return Err(ClinicError::not_found("Unresolved match flag", flag_id));
            }
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Update,
                "patient_match_flag",
                flag_id,
                "Resolved patient match flag",
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(name: &str, email: &str, phone: &str) -> PatientContact {
        PatientContact {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    fn existing(db: &Database, name: &str, email: &str, phone: &str) -> Patient {
        let patient = Patient::new(name.into(), email.into(), phone.into());
        db.insert_patient(&patient).unwrap();
        patient
    }

    #[test]
    fn test_new_patient_when_no_candidates() {
        let db = Database::open_in_memory().unwrap();
        let resolution = resolve_patient(&db, &contact("Ana Reyes", "ana@x.com", "09171234567")).unwrap();
        assert!(resolution.created);
        assert_eq!(resolution.outcome, MatchOutcome::New);
        assert!(db.get_patient(&resolution.patient.patient_id).unwrap().is_some());
    }

    #[test]
    fn test_email_match_reused() {
        let db = Database::open_in_memory().unwrap();
        let ana = existing(&db, "Ana Reyes", "ana@x.com", "09171234567");

        let resolution = resolve_patient(&db, &contact("Ana R.", "ANA@x.com", "0999 000 0000")).unwrap();
        assert!(!resolution.created);
        assert_eq!(resolution.patient.patient_id, ana.patient_id);
        assert!(resolution.outcome.flag_reason().is_none());
    }

    #[test]
    fn test_email_match_under_other_name_is_flagged() {
        let db = Database::open_in_memory().unwrap();
        let ana = existing(&db, "Ana Reyes", "ana@x.com", "09171234567");

        let resolution = resolve_patient(&db, &contact("Ben Cruz", "ana@x.com", "09171234567")).unwrap();
        assert!(!resolution.created);
        assert_eq!(resolution.patient.patient_id, ana.patient_id);
        assert!(matches!(resolution.outcome, MatchOutcome::EmailNameDiffers { .. }));
        assert!(resolution.outcome.flag_reason().is_some());
    }

    #[test]
    fn test_email_and_phone_pointing_at_different_patients() {
        let db = Database::open_in_memory().unwrap();
        let ana = existing(&db, "Ana Reyes", "ana@x.com", "09171111111");
        let ben = existing(&db, "Ben Cruz", "ben@x.com", "09172222222");

        let resolution = resolve_patient(&db, &contact("Ben Cruz", "ana@x.com", "09172222222")).unwrap();
        assert!(resolution.created);
        assert_ne!(resolution.patient.patient_id, ana.patient_id);
        assert_ne!(resolution.patient.patient_id, ben.patient_id);
        assert_eq!(
            resolution.outcome,
            MatchOutcome::Ambiguous {
                candidate_ids: vec![ana.patient_id, ben.patient_id]
            }
        );
        assert!(resolution.outcome.flag_reason().is_some());
    }

    #[test]
    fn test_phone_match_with_similar_name_reused_and_flagged() {
        let db = Database::open_in_memory().unwrap();
        let ana = existing(&db, "Ana Reyes", "old@x.com", "0917-123-4567");

        let resolution = resolve_patient(&db, &contact("ana  reyes", "new@x.com", "09171234567")).unwrap();
        assert!(!resolution.created);
        assert_eq!(resolution.patient.patient_id, ana.patient_id);
        assert!(matches!(resolution.outcome, MatchOutcome::PhoneOnly { .. }));
        assert!(resolution.outcome.flag_reason().is_some());
    }

    #[test]
    fn test_phone_match_with_different_name_creates_flagged() {
        let db = Database::open_in_memory().unwrap();
        let parent = existing(&db, "Maria Santos", "maria@x.com", "09171234567");

        let resolution = resolve_patient(&db, &contact("Jose Santos", "jose@x.com", "09171234567")).unwrap();
        assert!(resolution.created);
        assert_eq!(
            resolution.outcome,
            MatchOutcome::Ambiguous {
                candidate_ids: vec![parent.patient_id]
            }
        );
    }

    #[test]
    fn test_duplicate_email_candidates_never_merged() {
        let db = Database::open_in_memory().unwrap();
        existing(&db, "Ana Reyes", "shared@x.com", "09171111111");
        existing(&db, "Ben Reyes", "shared@x.com", "09172222222");

        let resolution = resolve_patient(&db, &contact("Ana Reyes", "shared@x.com", "09173333333")).unwrap();
        assert!(resolution.created);
        assert_eq!(resolution.candidate_ids.len(), 2);
    }

    #[test]
    fn test_registry_resolves_flag_once() {
        let db = Database::open_in_memory().unwrap();
        let ana = existing(&db, "Ana Reyes", "ana@x.com", "09171234567");
        db.conn()
            .execute_batch(
                r#"
                INSERT INTO services (service_id, name, price) VALUES ('svc', 'Consult', 50000);
                INSERT INTO bookings (booking_id, service_id, patient_name, patient_email,
                                      patient_phone, date, time, status)
                VALUES ('bk', 'svc', 'Ana', 'ana@x.com', '0917', '2030-01-02', '09:00', 'confirmed');
                "#,
            )
            .unwrap();
        let flag = PatientMatchFlag {
            flag_id: "flag".into(),
            booking_id: "bk".into(),
            patient_id: ana.patient_id.clone(),
            candidate_ids: vec![ana.patient_id.clone()],
            reason: "Matched by phone only".into(),
            resolved: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        db.insert_match_flag(&flag).unwrap();

        let registry = PatientRegistry::new(&db);
        assert_eq!(registry.match_flags(true).unwrap().len(), 1);
        registry.resolve_flag("flag", "admin").unwrap();
        assert!(registry.match_flags(true).unwrap().is_empty());
        assert!(matches!(
            registry.resolve_flag("flag", "admin"),
            Err(ClinicError::NotFound { .. })
        ));
        assert_eq!(registry.search("reyes", 10).unwrap().len(), 1);
    }
}
