//! Clinical and financial records created for a confirmed booking, and
//! staff edits of those records afterwards.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::ActivityLog;
use crate::config::ClinicRules;
use crate::db::{now_rfc3339, Database, DbError, DbResult};
use crate::error::{ClinicError, ClinicResult};
use crate::ledger::{move_stock, store_fees};
use crate::models::{
    ActivityAction, Billing, Booking, Cents, ImageType, MedicalImage, MedicalRecord, Patient,
    PatientMatchFlag, Prescription, PrescriptionInput, RecordAmendment, TransactionType,
};

use super::matching::resolve_patient;

/// Everything the accept transition produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptanceOutcome {
    pub booking: Booking,
    pub patient: Patient,
    pub patient_created: bool,
    pub record: MedicalRecord,
    pub billing: Billing,
    /// Raised when the patient match needs staff review
    pub match_flag: Option<PatientMatchFlag>,
}

/// Patient, record and billing for a booking being confirmed.
pub(crate) struct VisitRecords {
    pub patient: Patient,
    pub patient_created: bool,
    pub record: MedicalRecord,
    pub billing: Billing,
    pub match_flag: Option<PatientMatchFlag>,
}

impl VisitRecords {
    pub fn with_booking(self, booking: Booking) -> AcceptanceOutcome {
        AcceptanceOutcome {
            booking,
            patient: self.patient,
            patient_created: self.patient_created,
            record: self.record,
            billing: self.billing,
            match_flag: self.match_flag,
        }
    }
}

/// Create the patient, medical record and billing for a booking.
///
/// Runs inside the caller's transaction. Any failure here must abort the
/// whole transition, so the caller maps errors to `Integrity`.
pub(crate) fn open_visit(
    db: &Database,
    rules: &ClinicRules,
    booking: &Booking,
    actor: &str,
) -> DbResult<VisitRecords> {
    let service = db
        .get_service(&booking.service_id)?
        .ok_or_else(|| DbError::NotFound(format!("service {}", booking.service_id)))?;

    let resolution = resolve_patient(db, &booking.contact())?;
    let match_flag = match resolution.outcome.flag_reason() {
        Some(reason) => {
            let flag = PatientMatchFlag {
                flag_id: uuid::Uuid::new_v4().to_string(),
                booking_id: booking.booking_id.clone(),
                patient_id: resolution.patient.patient_id.clone(),
                candidate_ids: resolution.candidate_ids.clone(),
                reason,
                resolved: false,
                created_at: now_rfc3339(),
            };
            db.insert_match_flag(&flag)?;
            Some(flag)
        }
        None => None,
    };

    let complaint = if booking.notes.trim().is_empty() {
        format!("Consultation: {}", service.name)
    } else {
        booking.notes.trim().to_string()
    };
    let mut record = MedicalRecord::new(
        resolution.patient.patient_id.clone(),
        Some(booking.booking_id.clone()),
        complaint,
    );
    record.created_by = Some(actor.to_string());
    db.insert_medical_record(&record)?;

    let fee = if service.price > 0 {
        service.price
    } else {
        rules.default_service_fee
    };
    let billing = Billing::new(booking.booking_id.clone(), fee);
    db.insert_billing(&billing)?;

    let log = ActivityLog::new(db);
    if resolution.created {
        log.append(
            actor,
            ActivityAction::Create,
            "patient",
            &resolution.patient.patient_id,
            format!("Registered patient {}", resolution.patient.full_name),
        )?;
    }
    log.append(
        actor,
        ActivityAction::Create,
        "billing",
        &billing.billing_id,
        format!("Billed booking {} for {}", booking.booking_id, service.name),
    )?;

    Ok(VisitRecords {
        patient: resolution.patient,
        patient_created: resolution.created,
        record,
        billing,
        match_flag,
    })
}

/// Metadata for an image attached to a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImageUpload {
    pub path: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_type: ImageType,
}

/// Staff operations on medical records.
pub struct MedicalRecords<'a> {
    db: &'a Database,
}

impl<'a> MedicalRecords<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn amend(&self, record_id: &str, amendment: &RecordAmendment, actor: &str) -> ClinicResult<MedicalRecord> {
        self.db.write_transaction(|db| {
            let mut record = db
                .get_medical_record(record_id)?
                .ok_or_else(|| ClinicError::not_found("Medical record", record_id))?;

            if let Some(complaint) = &amendment.chief_complaint {
                if complaint.trim().is_empty() {
                    return Err(ClinicError::invalid_input("chief_complaint", "is required"));
                }
                record.chief_complaint = complaint.trim().to_string();
            }
            if let Some(symptoms) = &amendment.symptoms {
                record.symptoms = symptoms.clone();
            }
            if let Some(diagnosis) = &amendment.diagnosis {
                record.diagnosis = diagnosis.clone();
            }
            if let Some(plan) = &amendment.treatment_plan {
                record.treatment_plan = plan.clone();
            }
            if let Some(vitals) = &amendment.vitals {
                record.vitals = vitals.clone();
            }
            if amendment.follow_up_date.is_some() {
                record.follow_up_date = amendment.follow_up_date;
            }
            if let Some(notes) = &amendment.notes {
                record.notes = notes.clone();
            }
            record.updated_at = now_rfc3339();

            db.update_medical_record(&record)?;
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Update,
                "medical_record",
                record_id,
                "Amended medical record",
            )?;
            Ok(record)
        })
    }

    /// Prescribe a medicine. Stocked medicines are deducted from inventory
    /// and the visit's billing picks up the new medicine fee.
    pub fn add_prescription(
        &self,
        record_id: &str,
        input: &PrescriptionInput,
        actor: &str,
    ) -> ClinicResult<Prescription> {
        if input.quantity <= 0 {
            return Err(ClinicError::invalid_input("quantity", "must be positive"));
        }
        if input.dosage.trim().is_empty() {
            return Err(ClinicError::invalid_input("dosage", "is required"));
        }
        if let Some(price) = input.unit_price {
            if price < 0 {
                return Err(ClinicError::InvalidAmount {
                    amount: price,
                    reason: "unit price cannot be negative".into(),
                });
            }
        }

        let prescription = self.db.write_transaction(|db| {
            let record = db
                .get_medical_record(record_id)?
                .ok_or_else(|| ClinicError::not_found("Medical record", record_id))?;

            let (medicine_name, unit_price): (String, Cents) =
                match (&input.item_id, &input.custom_medicine_name) {
                    (Some(item_id), None) => {
                        let movement = move_stock(
                            db,
                            item_id,
                            -input.quantity,
                            TransactionType::StockOut,
                            &format!("Prescription for record {}", record_id),
                            actor,
                        )?;
                        (
                            movement.item.name,
                            input.unit_price.unwrap_or(movement.item.unit_price),
                        )
                    }
                    (None, Some(name)) if !name.trim().is_empty() => {
                        (name.trim().to_string(), input.unit_price.unwrap_or(0))
                    }
                    _ => {
                        return Err(ClinicError::invalid_input(
                            "medicine",
                            "give either an inventory item or a custom medicine name",
                        ))
                    }
                };

            let total_price = unit_price
                .checked_mul(input.quantity)
                .ok_or_else(|| ClinicError::out_of_range(unit_price, "prescription total"))?;
            let prescription = Prescription {
                prescription_id: uuid::Uuid::new_v4().to_string(),
                record_id: record_id.to_string(),
                item_id: input.item_id.clone(),
                medicine_name,
                quantity: input.quantity,
                dosage: input.dosage.trim().to_string(),
                duration: input.duration.clone(),
                instructions: input.instructions.clone(),
                unit_price,
                total_price,
                prescribed_by: actor.to_string(),
                prescribed_at: now_rfc3339(),
            };
            db.insert_prescription(&prescription)?;

            if let Some(booking_id) = &record.booking_id {
                if let Some(mut billing) = db.get_billing_for_booking(booking_id)? {
                    billing.medicine_fee = db.prescription_total(record_id)?;
                    store_fees(db, &mut billing)?;
                }
            }

            ActivityLog::new(db).append(
                actor,
                ActivityAction::Create,
                "prescription",
                &prescription.prescription_id,
                format!(
                    "Prescribed {} x{} on record {}",
                    prescription.medicine_name, prescription.quantity, record_id
                ),
            )?;
            Ok::<_, ClinicError>(prescription)
        })?;

        info!(
            record_id = %record_id,
            medicine = %prescription.medicine_name,
            quantity = prescription.quantity,
            "prescription added"
        );
        Ok(prescription)
    }

    pub fn attach_image(&self, record_id: &str, upload: &ImageUpload, actor: &str) -> ClinicResult<MedicalImage> {
        if upload.path.trim().is_empty() {
            return Err(ClinicError::invalid_input("path", "is required"));
        }
        if upload.title.trim().is_empty() {
            return Err(ClinicError::invalid_input("title", "is required"));
        }

        self.db.write_transaction(|db| {
            if db.get_medical_record(record_id)?.is_none() {
                return Err(ClinicError::not_found("Medical record", record_id));
            }
            let image = MedicalImage {
                image_id: uuid::Uuid::new_v4().to_string(),
                record_id: record_id.to_string(),
                path: upload.path.trim().to_string(),
                title: upload.title.trim().to_string(),
                description: upload.description.clone(),
                image_type: upload.image_type,
                uploaded_by: actor.to_string(),
                uploaded_at: now_rfc3339(),
            };
            db.insert_medical_image(&image)?;
            ActivityLog::new(db).append(
                actor,
                ActivityAction::Create,
                "medical_image",
                &image.image_id,
                format!("Attached {} to record {}", image.title, record_id),
            )?;
            Ok(image)
        })
    }

    pub fn get(&self, record_id: &str) -> ClinicResult<MedicalRecord> {
        self.db
            .get_medical_record(record_id)?
            .ok_or_else(|| ClinicError::not_found("Medical record", record_id))
    }

    pub fn for_booking(&self, booking_id: &str) -> ClinicResult<Option<MedicalRecord>> {
        Ok(self.db.get_record_for_booking(booking_id)?)
    }

    pub fn for_patient(&self, patient_id: &str) -> ClinicResult<Vec<MedicalRecord>> {
        Ok(self.db.list_records_for_patient(patient_id)?)
    }

    pub fn prescriptions(&self, record_id: &str) -> ClinicResult<Vec<Prescription>> {
        Ok(self.db.list_prescriptions(record_id)?)
    }

    pub fn images(&self, record_id: &str) -> ClinicResult<Vec<MedicalImage>> {
        Ok(self.db.list_medical_images(record_id)?)
    }
}
