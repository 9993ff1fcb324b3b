//! Patient and clinical record models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Cents;

/// Blood type as recorded on the patient chart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BloodType {
    APositive,
    ANegative,
    BPositive,
    BNegative,
    AbPositive,
    AbNegative,
    OPositive,
    ONegative,
    Unknown,
}

impl BloodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
            BloodType::Unknown => "UK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A+" => Some(BloodType::APositive),
            "A-" => Some(BloodType::ANegative),
            "B+" => Some(BloodType::BPositive),
            "B-" => Some(BloodType::BNegative),
            "AB+" => Some(BloodType::AbPositive),
            "AB-" => Some(BloodType::AbNegative),
            "O+" => Some(BloodType::OPositive),
            "O-" => Some(BloodType::ONegative),
            "UK" => Some(BloodType::Unknown),
            _ => None,
        }
    }
}

/// A clinical patient record, distinct from the bookings that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Unique patient ID
    pub patient_id: String,
    /// Linked login account, if the patient has one
    pub user_account: Option<String>,
    /// Full name
    pub full_name: String,
    /// Contact email (matching key for repeat visitors)
    pub email: String,
    /// Contact phone (secondary matching key)
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub address: String,
    pub blood_type: BloodType,
    /// Known allergies
    pub allergies: String,
    pub current_medications: String,
    pub medical_history: String,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    pub fn phone_digits(&self) -> String {
        phone_digits(&self.phone)
    }

    /// Create a new patient from booking contact details.
    pub fn new(full_name: String, email: String, phone: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            patient_id: uuid::Uuid::new_v4().to_string(),
            user_account: None,
            full_name,
            email,
            phone,
            date_of_birth: None,
            address: String::new(),
            blood_type: BloodType::Unknown,
            allergies: String::new(),
            current_medications: String::new(),
            medical_history: String::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Vital signs captured during a visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Vitals {
    /// Body temperature in °C
    pub temperature_c: Option<f64>,
    pub bp_systolic: Option<i64>,
    pub bp_diastolic: Option<i64>,
    /// Beats per minute
    pub heart_rate: Option<i64>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
}

/// One clinical visit entry owned by a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicalRecord {
    /// Unique record ID
    pub record_id: String,
    /// Owning patient
    pub patient_id: String,
    /// Booking whose acceptance created this record
    pub booking_id: Option<String>,
    /// Visit timestamp
    pub visit_date: String,
    /// Main reason for the visit
    pub chief_complaint: String,
    pub symptoms: String,
    pub diagnosis: String,
    pub treatment_plan: String,
    pub vitals: Vitals,
    pub follow_up_date: Option<NaiveDate>,
    pub notes: String,
    /// Staff member who created the record
    pub created_by: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl MedicalRecord {
    /// Create an empty visit record for a patient.
    pub fn new(patient_id: String, booking_id: Option<String>, chief_complaint: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            booking_id,
            visit_date: now.clone(),
            chief_complaint,
            symptoms: String::new(),
            diagnosis: String::new(),
            treatment_plan: String::new(),
            vitals: Vitals::default(),
            follow_up_date: None,
            notes: String::new(),
            created_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Staff amendment to a medical record. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecordAmendment {
    pub chief_complaint: Option<String>,
    pub symptoms: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub vitals: Option<Vitals>,
    pub follow_up_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// A medicine prescribed during a visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub prescription_id: String,
    pub record_id: String,
    /// Inventory item dispensed, if the medicine is stocked
    pub item_id: Option<String>,
    /// Medicine name (inventory name or custom)
    pub medicine_name: String,
    pub quantity: i64,
    /// e.g. "1 tablet twice daily"
    pub dosage: String,
    /// e.g. "7 days"
    pub duration: String,
    pub instructions: String,
    pub unit_price: Cents,
    /// `unit_price × quantity`
    pub total_price: Cents,
    pub prescribed_by: String,
    pub prescribed_at: String,
}

/// Input for adding a prescription.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PrescriptionInput {
    /// Stocked medicine; dispensing deducts inventory
    pub item_id: Option<String>,
    /// Name for medicines not carried in inventory
    pub custom_medicine_name: Option<String>,
    pub quantity: i64,
    pub dosage: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub instructions: String,
    /// Defaults to the inventory price, or zero for custom medicines
    pub unit_price: Option<Cents>,
}

/// Kind of clinical image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageType {
    Clinical,
    Dermoscopy,
    Before,
    After,
    Diagnostic,
    Other,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Clinical => "clinical",
            ImageType::Dermoscopy => "dermoscopy",
            ImageType::Before => "before",
            ImageType::After => "after",
            ImageType::Diagnostic => "diagnostic",
            ImageType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clinical" => Some(ImageType::Clinical),
            "dermoscopy" => Some(ImageType::Dermoscopy),
            "before" => Some(ImageType::Before),
            "after" => Some(ImageType::After),
            "diagnostic" => Some(ImageType::Diagnostic),
            "other" => Some(ImageType::Other),
            _ => None,
        }
    }
}

/// Metadata of an image attached to a medical record. The file itself is
/// stored by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicalImage {
    pub image_id: String,
    pub record_id: String,
    pub path: String,
    pub title: String,
    pub description: String,
    pub image_type: ImageType,
    pub uploaded_by: String,
    pub uploaded_at: String,
}

/// An ambiguous patient match raised during booking acceptance, left for
/// staff to reconcile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientMatchFlag {
    pub flag_id: String,
    /// Booking whose acceptance raised the flag
    pub booking_id: String,
    /// Patient the booking was linked to
    pub patient_id: String,
    /// Other existing patients that matched the contact details
    pub candidate_ids: Vec<String>,
    pub reason: String,
    pub resolved: bool,
    pub created_at: String,
}

/// Strip a phone number down to its digits for matching.
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_patient_defaults() {
        let patient = Patient::new("Ana Cruz".into(), "ana@example.com".into(), "09171234567".into());
        assert_eq!(patient.blood_type, BloodType::Unknown);
        assert!(patient.user_account.is_none());
        assert_eq!(patient.patient_id.len(), 36);
    }

    #[test]
    fn test_blood_type_strings() {
        assert_eq!(BloodType::parse("AB-"), Some(BloodType::AbNegative));
        assert_eq!(BloodType::AbNegative.as_str(), "AB-");
        assert_eq!(BloodType::parse("Z"), None);
    }

    #[test]
    fn test_phone_digits() {
        assert_eq!(phone_digits("+63 (917) 123-4567"), "639171234567");
        assert_eq!(phone_digits("n/a"), "");
    }
}
